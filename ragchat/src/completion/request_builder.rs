use crate::model_profiles::resolve_profile;
use crate::protocol::{ChatMessage, CompletionRequest};
use serde_json::{json, Value};

/// Build a request, clamping temperature into [0, 1].
pub fn build_completion_request(
    model: &str,
    temperature: f32,
    messages: Vec<ChatMessage>,
    max_retries: u32,
) -> CompletionRequest {
    let temperature = if temperature.is_finite() {
        temperature.clamp(0.0, 1.0)
    } else {
        0.0
    };
    CompletionRequest {
        model: model.to_string(),
        temperature,
        messages,
        max_retries,
    }
}

/// JSON body for `/chat/completions`. Temperature is omitted for models whose
/// profile rejects it.
pub fn build_chat_request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
        "stream": false,
    });
    if resolve_profile(&request.model).supports_temperature {
        body["temperature"] = json!(request.temperature);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_is_clamped() {
        assert_eq!(build_completion_request("m", 1.7, vec![], 0).temperature, 1.0);
        assert_eq!(build_completion_request("m", -0.2, vec![], 0).temperature, 0.0);
        assert_eq!(build_completion_request("m", f32::NAN, vec![], 0).temperature, 0.0);
        assert_eq!(build_completion_request("m", 0.5, vec![], 0).temperature, 0.5);
    }

    #[test]
    fn test_body_shape() {
        let request = build_completion_request("gpt-4o", 0.5, vec![ChatMessage::user("hi")], 2);
        let body = build_chat_request_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["temperature"], json!(0.5));
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_reasoning_models_omit_temperature() {
        let request = build_completion_request("o3-mini", 0.7, vec![ChatMessage::user("hi")], 0);
        assert!(build_chat_request_body(&request).get("temperature").is_none());
    }
}
