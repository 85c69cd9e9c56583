//! Input Classifier
//!
//! Cheap local checks that run before anything is sent to the model:
//! - Undo requests ("undo", "revert", "cancel last")
//! - Bare amounts answering an earlier "how much?" question
//!
//! Everything else is delegated to the language model.

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalIntent {
    Undo,
    AmountReply(f64),
    Delegate,
}

/// Matched as lowercase substrings
const UNDO_KEYWORDS: &[&str] = &["undo", "revert", "cancel last"];

lazy_static! {
    static ref BARE_AMOUNT: Regex = Regex::new(r"^\d+(\.\d+)?$").expect("valid regex");
}

pub struct InputClassifier;

impl InputClassifier {
    /// Classify a chat message. `awaiting_amount` is true when the previous
    /// turn asked for the amount of a pending add.
    pub fn classify(text: &str, awaiting_amount: bool) -> LocalIntent {
        let trimmed = text.trim();

        if awaiting_amount && BARE_AMOUNT.is_match(trimmed) {
            if let Ok(amount) = trimmed.parse::<f64>() {
                return LocalIntent::AmountReply(amount);
            }
        }

        let lowered = trimmed.to_lowercase();
        if UNDO_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return LocalIntent::Undo;
        }

        LocalIntent::Delegate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_phrases() {
        for c in ["undo", "Please UNDO that", "revert the last change", "cancel last one"] {
            assert_eq!(InputClassifier::classify(c, false), LocalIntent::Undo);
        }
    }

    #[test]
    fn test_amount_reply_only_when_awaiting() {
        assert_eq!(
            InputClassifier::classify(" 45000 ", true),
            LocalIntent::AmountReply(45000.0)
        );
        assert_eq!(
            InputClassifier::classify("99.50", true),
            LocalIntent::AmountReply(99.5)
        );
        assert_eq!(InputClassifier::classify("45000", false), LocalIntent::Delegate);
    }

    #[test]
    fn test_delegated_inputs() {
        let cases = [
            "spent 500 on food",
            "balance kitna hai",
            "₹500",
            "500 rupees",
            "delete all shopping",
        ];
        for c in cases {
            assert_eq!(InputClassifier::classify(c, true), LocalIntent::Delegate);
        }
    }
}
