//! Reason - Length-bounded justification text
//!
//! Every validation request (and every rejection) carries a free-text
//! justification. The bounds are enforced at the type level so an empty
//! or essay-length reason can never reach the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum accepted reason length, in characters.
pub const REASON_MIN_CHARS: usize = 10;

/// Maximum accepted reason length, in characters.
pub const REASON_MAX_CHARS: usize = 500;

/// Errors that can occur when validating a reason
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReasonError {
    #[error("Reason too short: {0} chars (minimum {REASON_MIN_CHARS})")]
    TooShort(usize),

    #[error("Reason too long: {0} chars (maximum {REASON_MAX_CHARS})")]
    TooLong(usize),
}

/// A justification string of 10-500 characters.
///
/// # Invariant
/// The inner text is trimmed and its character count is always within
/// `[REASON_MIN_CHARS, REASON_MAX_CHARS]`. Enforced by the constructor.
///
/// # Example
/// ```
/// use tontine_core::Reason;
///
/// let reason = Reason::new("member left the group in March").unwrap();
/// assert_eq!(reason.as_str(), "member left the group in March");
///
/// // Too short to be an audit-worthy justification
/// assert!(Reason::new("because").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reason(String);

impl Reason {
    /// Create a new Reason from free text.
    ///
    /// Leading/trailing whitespace is trimmed before the bounds check.
    pub fn new(text: impl AsRef<str>) -> Result<Self, ReasonError> {
        let trimmed = text.as_ref().trim();
        let chars = trimmed.chars().count();

        if chars < REASON_MIN_CHARS {
            Err(ReasonError::TooShort(chars))
        } else if chars > REASON_MAX_CHARS {
            Err(ReasonError::TooLong(chars))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Get the inner text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Reason {
    type Error = ReasonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Reason> for String {
    fn from(reason: Reason) -> Self {
        reason.0
    }
}
