//! Message construction utilities for completion requests.
//!
//! This module maps session history onto OpenAI-compatible wire messages.

use crate::protocol::{ChatMessage, Message};

/// Convert one history message to its wire form (User -> `user`, Assistant -> `assistant`).
pub fn create_history_message(message: &Message) -> ChatMessage {
    ChatMessage {
        role: message.role.as_wire().to_string(),
        content: message.text.clone(),
    }
}

/// Convert the whole history, preserving order.
pub fn create_history_messages(history: &[Message]) -> Vec<ChatMessage> {
    history.iter().map(create_history_message).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_roles_map_to_wire_roles() {
        let history = vec![Message::user("hi"), Message::assistant("hello!")];
        let wire = create_history_messages(&history);
        assert_eq!(wire[0], ChatMessage::user("hi"));
        assert_eq!(wire[1].role, "assistant");
        assert_eq!(wire[1].content, "hello!");
    }
}
