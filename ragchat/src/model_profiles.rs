//! Model Profiles - Regex-based model matching for hosted chat models
//!
//! Each profile records what the request builder needs to know about a model
//! family without hardcoding model IDs in the core logic:
//! - A regex pattern to match model names
//! - A cost tier, used to describe fallback choices
//! - Whether the endpoint accepts a `temperature` parameter

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Economy,
    Standard,
    Premium,
    Reasoning,
}

/// A model profile that describes how to talk to a specific model family
pub struct ModelProfile {
    /// Unique identifier for this profile
    pub id: &'static str,
    /// Regex pattern to match model names (case-insensitive)
    pattern: Regex,
    pub tier: ModelTier,
    /// Reasoning models reject sampling parameters
    pub supports_temperature: bool,
    /// Example model id listed by `/models`
    pub example: &'static str,
}

impl ModelProfile {
    fn new(
        id: &'static str,
        pattern: &str,
        tier: ModelTier,
        supports_temperature: bool,
        example: &'static str,
    ) -> Self {
        Self {
            id,
            pattern: Regex::new(&format!("(?i){}", pattern)).expect("Invalid regex pattern"),
            tier,
            supports_temperature,
            example,
        }
    }

    /// Check if this profile matches the given model name
    pub fn matches(&self, model_name: &str) -> bool {
        self.pattern.is_match(model_name)
    }
}

// ========== Profile Registry ==========

// Order matters: the first matching profile wins
lazy_static::lazy_static! {
    static ref PROFILES: Vec<ModelProfile> = vec![
        ModelProfile::new("reasoning", r"^(o\d+)(-|$)", ModelTier::Reasoning, false, "o3-mini"),
        ModelProfile::new("gpt4o_mini", r"gpt-4o-mini|gpt-4\.1-mini|gpt-4\.1-nano", ModelTier::Economy, true, "gpt-4o-mini"),
        ModelProfile::new("gpt4o", r"gpt-4o|gpt-4\.1", ModelTier::Premium, true, "gpt-4o"),
        ModelProfile::new("gpt4", r"gpt-4", ModelTier::Premium, true, "gpt-4-turbo"),
        ModelProfile::new("gpt35", r"gpt-3\.5", ModelTier::Economy, true, "gpt-3.5-turbo"),
    ];

    static ref DEFAULT_PROFILE: ModelProfile = ModelProfile::new(
        "default",
        r".*",
        ModelTier::Standard,
        true,
        "any OpenAI-compatible model id",
    );
}

/// Resolve the appropriate profile for a given model name
pub fn resolve_profile(model_name: &str) -> &'static ModelProfile {
    match PROFILES.iter().find(|p| p.matches(model_name)) {
        Some(profile) => {
            tracing::debug!(model = model_name, profile = profile.id, "Resolved model profile");
            profile
        }
        None => {
            tracing::debug!(model = model_name, "Using default model profile");
            &DEFAULT_PROFILE
        }
    }
}

/// Get all registered profiles
pub fn all_profiles() -> &'static [ModelProfile] {
    &PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_matching() {
        assert_eq!(resolve_profile("gpt-4o-mini").id, "gpt4o_mini");
        assert_eq!(resolve_profile("gpt-4o-2024-08-06").id, "gpt4o");
        assert_eq!(resolve_profile("GPT-3.5-Turbo").id, "gpt35");
        assert_eq!(resolve_profile("o3-mini").id, "reasoning");
        assert_eq!(resolve_profile("o1").id, "reasoning");
        assert_eq!(resolve_profile("llama3-70b").id, "default");
    }

    #[test]
    fn test_reasoning_models_reject_temperature() {
        assert!(!resolve_profile("o1-preview").supports_temperature);
        assert!(resolve_profile("gpt-4o").supports_temperature);
        assert!(resolve_profile("some-local-model").supports_temperature);
    }

    #[test]
    fn test_examples_resolve_to_their_own_profile() {
        for profile in all_profiles() {
            assert_eq!(resolve_profile(profile.example).id, profile.id);
        }
    }
}
