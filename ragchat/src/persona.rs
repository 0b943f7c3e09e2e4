//! Named instruction presets that shape the assistant's response style.

use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    Helpful,
    Concise,
    Creative,
    Technical,
    Friendly,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::Helpful,
        Persona::Concise,
        Persona::Creative,
        Persona::Technical,
        Persona::Friendly,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Persona::Helpful => "helpful",
            Persona::Concise => "concise",
            Persona::Creative => "creative",
            Persona::Technical => "technical",
            Persona::Friendly => "friendly",
        }
    }

    /// System instruction sent first in every prompt
    pub fn instruction(self) -> &'static str {
        match self {
            Persona::Helpful => {
                "You are a helpful assistant. Answer clearly and accurately, and say so when you are unsure."
            }
            Persona::Concise => {
                "You are a concise assistant. Answer in as few words as possible without losing accuracy."
            }
            Persona::Creative => {
                "You are a creative assistant. Offer imaginative ideas and vivid language while staying on topic."
            }
            Persona::Technical => {
                "You are a technical expert. Give precise, detailed answers and include code or exact steps where useful."
            }
            Persona::Friendly => {
                "You are a friendly, upbeat assistant. Keep a warm conversational tone while being genuinely useful."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Persona {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Persona::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| {
                ChatError::configuration(format!(
                    "Unknown persona '{}'. Available: {}",
                    s,
                    Persona::ALL.map(|p| p.id()).join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_persona_ids() {
        assert_eq!("concise".parse::<Persona>().unwrap(), Persona::Concise);
        assert_eq!(" Technical ".parse::<Persona>().unwrap(), Persona::Technical);
        assert!("pirate".parse::<Persona>().is_err());
    }

    #[test]
    fn test_every_persona_roundtrips_through_its_id() {
        for persona in Persona::ALL {
            assert_eq!(persona.id().parse::<Persona>().unwrap(), persona);
            assert!(!persona.instruction().is_empty());
        }
    }
}
