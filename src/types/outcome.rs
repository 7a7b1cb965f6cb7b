//! Result of a resilient generation call.

use serde::{Deserialize, Serialize};

/// Outcome of one controller call.
///
/// Separates a legitimately empty completion from a call that ran out of
/// attempts. [`into_text()`](Self::into_text) collapses both back into the
/// empty-string convention for callers that only want text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// The generator returned text (possibly empty after trimming).
    Success { text: String, attempts: u32 },
    /// No usable text was produced.
    Failure { reason: FailureReason, attempts: u32 },
}

/// Why a call produced no text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Every attempt failed; carries the description of the last error.
    Exhausted { last_error: String },
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Number of remote calls made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => *attempts,
        }
    }

    /// Generated text, or `None` on failure.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success { text, .. } => Some(text),
            Self::Failure { .. } => None,
        }
    }

    /// Generated text, with failure mapped to the empty string.
    pub fn into_text(self) -> String {
        match self {
            Self::Success { text, .. } => text,
            Self::Failure { .. } => String::new(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { last_error } => write!(f, "retries exhausted: {last_error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_collapses_to_empty_text() {
        let outcome = GenerationOutcome::Failure {
            reason: FailureReason::Exhausted {
                last_error: "boom".into(),
            },
            attempts: 3,
        };
        assert!(!outcome.is_success());
        assert_eq!(outcome.text(), None);
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.into_text(), "");
    }

    #[test]
    fn empty_success_is_still_success() {
        let outcome = GenerationOutcome::Success {
            text: String::new(),
            attempts: 1,
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.text(), Some(""));
    }
}
