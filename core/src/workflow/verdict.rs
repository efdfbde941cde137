//! Reading the verifier's judgment

use serde::{Deserialize, Serialize};

pub const VALID_TOKEN: &str = "valid";

/// How a judge reply is compared with the acceptance token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictPolicy {
    /// Case-insensitive equality with no trimming
    #[default]
    Exact,
    /// Also ignores surrounding whitespace, quotes, backticks, emphasis
    /// markers and trailing punctuation
    Lenient,
}

impl VerdictPolicy {
    /// Whether `feedback` accepts the code
    ///
    /// Verbose answers ("Yes, the code is valid.") are never acceptances.
    pub fn accepts(&self, feedback: &str) -> bool {
        match self {
            VerdictPolicy::Exact => feedback.to_lowercase() == VALID_TOKEN,
            VerdictPolicy::Lenient => {
                let trimmed = feedback
                    .trim()
                    .trim_end_matches(['.', '!'])
                    .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '_') || c.is_whitespace())
                    .trim_end_matches(['.', '!']);
                trimmed.to_lowercase() == VALID_TOKEN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_policy() {
        let policy = VerdictPolicy::Exact;
        assert!(policy.accepts("valid"));
        assert!(policy.accepts("VALID"));
        assert!(policy.accepts("Valid"));
        assert!(!policy.accepts("valid\n"));
        assert!(!policy.accepts(" valid"));
        assert!(!policy.accepts("\"valid\""));
    }

    #[test]
    fn test_lenient_policy() {
        let policy = VerdictPolicy::Lenient;
        assert!(policy.accepts("valid\n"));
        assert!(policy.accepts("  \"Valid\"  "));
        assert!(policy.accepts("`valid`"));
        assert!(policy.accepts("**valid**."));
        assert!(policy.accepts("Valid!"));
    }

    #[test]
    fn test_verbose_answers_are_rejected() {
        for policy in [VerdictPolicy::Exact, VerdictPolicy::Lenient] {
            assert!(!policy.accepts("Yes, the code is valid."));
            assert!(!policy.accepts("valid, but consider sorting"));
            assert!(!policy.accepts("invalid"));
            assert!(!policy.accepts(""));
        }
    }
}
