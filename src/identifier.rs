//! Content identifier parsing and validation
//!
//! Listing services hand out numeric identifiers either as JSON numbers or as
//! decimal strings (object keys, query parameters). Both normalize to
//! [`ContentId`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Positive numeric identifier of one piece of content
///
/// # Examples
///
/// ```
/// use artwork_crawler::identifier::ContentId;
///
/// let id = ContentId::parse(" 84512937 ").unwrap();
/// assert_eq!(id.get(), 84512937);
/// assert_eq!(id.to_string(), "84512937");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(u64);

impl ContentId {
    /// Wrap a raw identifier
    ///
    /// Zero is accepted here for callers that already validated their data;
    /// use [`ContentId::parse`] for untrusted input.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Parse an identifier string
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, not a decimal number, or zero.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentifierError::NotNumeric(trimmed.to_string()));
        }

        let raw: u64 = trimmed
            .parse()
            .map_err(|_| IdentifierError::OutOfRange(trimmed.to_string()))?;

        if raw == 0 {
            return Err(IdentifierError::Zero);
        }

        Ok(Self(raw))
    }

    /// Extract an identifier from a JSON number or numeric string
    ///
    /// Returns `None` for anything else, including zero and negative numbers.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().filter(|raw| *raw > 0).map(Self),
            Value::String(s) => Self::parse(s).ok(),
            _ => None,
        }
    }

    /// Raw numeric value
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for ContentId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Errors that can occur during identifier parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Empty input
    #[error("identifier cannot be empty")]
    Empty,

    /// Input contains non-digit characters
    #[error("identifier must be numeric, got '{0}'")]
    NotNumeric(String),

    /// Input does not fit in 64 bits
    #[error("identifier out of range: {0}")]
    OutOfRange(String),

    /// Zero is never a valid identifier
    #[error("identifier cannot be zero")]
    Zero,
}
