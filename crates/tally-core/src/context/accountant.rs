//! Token accounting
//!
//! Exact tokenization varies by provider, so counts are approximations from
//! character counts with a per-family safety margin. Overestimating slightly
//! is the intended failure mode: a conversation must never be submitted over
//! budget because the approximation ran low.

use crate::types::Message;

/// Tokenizer family a model resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerFamily {
    /// OpenAI cl100k-era models
    Cl100k,
    /// OpenAI o200k-era models
    O200k,
    /// Anthropic Claude models
    Claude,
    /// Anything unrecognized; carries the largest margin
    Fallback,
}

struct FamilyProfile {
    chars_per_token: f32,
    message_overhead: usize,
    safety_margin: f32,
}

impl TokenizerFamily {
    /// Resolve a model name to its closest family
    ///
    /// Unknown models never error; they fall back to the family with the
    /// largest safety margin.
    pub fn resolve(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.contains("gpt-4o") || model.contains("o200k") || model.starts_with("o1") {
            Self::O200k
        } else if model.contains("gpt") || model.contains("cl100k") {
            Self::Cl100k
        } else if model.contains("claude") {
            Self::Claude
        } else {
            Self::Fallback
        }
    }

    fn profile(&self) -> FamilyProfile {
        match self {
            Self::Cl100k => FamilyProfile {
                chars_per_token: 4.0,
                message_overhead: 4,
                safety_margin: 0.15,
            },
            Self::O200k => FamilyProfile {
                chars_per_token: 4.2,
                message_overhead: 4,
                safety_margin: 0.15,
            },
            Self::Claude => FamilyProfile {
                chars_per_token: 3.5,
                message_overhead: 3,
                safety_margin: 0.20,
            },
            Self::Fallback => FamilyProfile {
                chars_per_token: 4.0,
                message_overhead: 4,
                safety_margin: 0.25,
            },
        }
    }

    /// Safety margin applied on top of the raw estimate
    pub fn safety_margin(&self) -> f32 {
        self.profile().safety_margin
    }
}

/// Token counter with per-family safety margins
///
/// Deterministic and side-effect free; the same text and model always produce
/// the same count.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAccountant;

impl TokenAccountant {
    /// Create a new accountant
    pub fn new() -> Self {
        Self
    }

    /// Count tokens for a piece of text
    pub fn count(&self, text: &str, model: &str) -> usize {
        let profile = TokenizerFamily::resolve(model).profile();
        let raw = text.len() as f32 / profile.chars_per_token;
        (raw * (1.0 + profile.safety_margin)).ceil() as usize
    }

    /// Count tokens for a message, including role/formatting overhead
    pub fn count_message(&self, message: &Message, model: &str) -> usize {
        let profile = TokenizerFamily::resolve(model).profile();
        self.count(&message.content, model) + profile.message_overhead
    }

    /// Count tokens for a whole message list
    pub fn count_all(&self, messages: &[Message], model: &str) -> usize {
        messages
            .iter()
            .map(|m| self.count_message(m, model))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_resolution() {
        assert_eq!(TokenizerFamily::resolve("gpt-4o-mini"), TokenizerFamily::O200k);
        assert_eq!(TokenizerFamily::resolve("gpt-3.5-turbo"), TokenizerFamily::Cl100k);
        assert_eq!(
            TokenizerFamily::resolve("claude-3.5-sonnet"),
            TokenizerFamily::Claude
        );
        assert_eq!(
            TokenizerFamily::resolve("some-local-model"),
            TokenizerFamily::Fallback
        );
    }

    #[test]
    fn test_unknown_model_gets_largest_margin() {
        let fallback = TokenizerFamily::resolve("mystery").safety_margin();
        for family in [
            TokenizerFamily::Cl100k,
            TokenizerFamily::O200k,
            TokenizerFamily::Claude,
        ] {
            assert!(fallback >= family.safety_margin());
        }
    }

    #[test]
    fn test_count_is_deterministic() {
        let accountant = TokenAccountant::new();
        let a = accountant.count("hello world, this is a test", "gpt-4");
        let b = accountant.count("hello world, this is a test", "gpt-4");
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn test_margin_is_applied() {
        let accountant = TokenAccountant::new();
        // 400 chars at 4 chars/token = 100 raw tokens, +15% margin = 115
        let text = "a".repeat(400);
        assert_eq!(accountant.count(&text, "gpt-4"), 115);
    }

    #[test]
    fn test_empty_text_counts_zero() {
        let accountant = TokenAccountant::new();
        assert_eq!(accountant.count("", "gpt-4"), 0);
    }

    #[test]
    fn test_count_message_adds_overhead() {
        let accountant = TokenAccountant::new();
        let message = Message::user("");
        assert_eq!(accountant.count_message(&message, "gpt-4"), 4);
    }

    #[test]
    fn test_count_all_sums_messages() {
        let accountant = TokenAccountant::new();
        let messages = vec![Message::user("hello"), Message::assistant("world")];

        let total = accountant.count_all(&messages, "gpt-4");
        let by_hand: usize = messages
            .iter()
            .map(|m| accountant.count_message(m, "gpt-4"))
            .sum();
        assert_eq!(total, by_hand);
    }
}
