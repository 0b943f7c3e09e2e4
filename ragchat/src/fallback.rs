//! Offline fallback responder.
//!
//! Canonical rule set, evaluated in this order; the first match wins and
//! matching is case-insensitive on whole words:
//!
//! | # | rule        | triggers                                                         |
//! |---|-------------|------------------------------------------------------------------|
//! | 1 | greeting    | hello, hi, hey, greetings, good morning/afternoon/evening         |
//! | 2 | gratitude   | thank, thanks, appreciate, appreciated                            |
//! | 3 | help        | help, assist, assistance, support                                 |
//! | 4 | how_are_you | how are you, how's it going, how is it going, how are things      |
//! | 5 | question    | ends with `?`, or starts with an interrogative or auxiliary verb  |
//! | 6 | default     | anything else                                                     |

use regex::Regex;

pub struct FallbackRule {
    pub id: &'static str,
    pattern: Option<Regex>,
    pub response: &'static str,
}

impl FallbackRule {
    fn new(id: &'static str, pattern: &str, response: &'static str) -> Self {
        Self {
            id,
            pattern: Some(Regex::new(&format!("(?i){}", pattern)).expect("Invalid regex pattern")),
            response,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().map_or(true, |p| p.is_match(text))
    }
}

lazy_static::lazy_static! {
    static ref RULES: Vec<FallbackRule> = vec![
        FallbackRule::new(
            "greeting",
            r"\b(hello|hi|hey|greetings|good (morning|afternoon|evening))\b",
            "Hello! I'm running in offline mode right now, but I'm happy to chat. What's on your mind?",
        ),
        FallbackRule::new(
            "gratitude",
            r"\b(thank|thanks|appreciate|appreciated)\b",
            "You're welcome! Let me know if there's anything else I can do.",
        ),
        FallbackRule::new(
            "help",
            r"\b(help|assist|assistance|support)\b",
            "I'd like to help, but I can't reach the language model at the moment. Try /recover once the service is available again.",
        ),
        FallbackRule::new(
            "how_are_you",
            r"\b(how are you|how's it going|how is it going|how are things)\b",
            "I'm doing fine, thanks for asking! I'm in offline mode for now, so my answers are limited.",
        ),
        FallbackRule::new(
            "question",
            r"(\?\s*$)|(^\s*(what|why|how|when|where|who|which|can|could|would|should|is|are|do|does|did|will)\b)",
            "That's a good question. I can't reach the language model right now, so I can't give you a proper answer. Please try again later.",
        ),
        FallbackRule {
            id: "default",
            pattern: None,
            response: "I'm currently unable to reach the language model. Please try again later, or use /recover when the service is back.",
        },
    ];
}

/// The first rule matching `text`. The last rule matches everything.
pub fn matching_rule(text: &str) -> &'static FallbackRule {
    RULES
        .iter()
        .find(|rule| rule.matches(text))
        .unwrap_or(&RULES[RULES.len() - 1])
}

/// Canned reply for `text`. Pure and deterministic.
pub fn fallback_response(text: &str) -> &'static str {
    matching_rule(text).response
}

pub fn all_rules() -> &'static [FallbackRule] {
    &RULES
}
