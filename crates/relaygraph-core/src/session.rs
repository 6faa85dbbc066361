use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validated identifier of a checkpointed conversation.
///
/// Session ids double as file names and database keys, so they are limited
/// to a conservative character set: ASCII alphanumerics, `_`, `-`, `.` and
/// `:`, at most [`SessionId::MAX_LENGTH`] characters, never starting with a
/// dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

/// Errors that can occur when creating a [`SessionId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSessionId {
    #[error("session id cannot be empty")]
    Empty,
    #[error("session id too long: {0} characters (max 128)")]
    TooLong(usize),
    #[error("session id contains invalid characters: '{0}'")]
    InvalidChars(String),
}

impl SessionId {
    /// Maximum allowed length for session ids.
    pub const MAX_LENGTH: usize = 128;

    pub fn new(id: &str) -> Result<Self, InvalidSessionId> {
        let id = id.trim();
        if id.is_empty() {
            return Err(InvalidSessionId::Empty);
        }
        if id.len() > Self::MAX_LENGTH {
            return Err(InvalidSessionId::TooLong(id.len()));
        }
        let valid_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
        if !valid_chars || id.starts_with('.') {
            return Err(InvalidSessionId::InvalidChars(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    /// A fresh random id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for console banners.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = InvalidSessionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc")]
    #[case("user-1234")]
    #[case("thread:2024.q1_sales")]
    fn test_valid_session_ids(#[case] raw: &str) {
        assert_eq!(SessionId::new(raw).unwrap().as_str(), raw);
    }

    #[rstest]
    #[case("", InvalidSessionId::Empty)]
    #[case("../etc/passwd", InvalidSessionId::InvalidChars("../etc/passwd".into()))]
    #[case(".hidden", InvalidSessionId::InvalidChars(".hidden".into()))]
    #[case("a b", InvalidSessionId::InvalidChars("a b".into()))]
    fn test_invalid_session_ids(#[case] raw: &str, #[case] expected: InvalidSessionId) {
        assert_eq!(SessionId::new(raw).unwrap_err(), expected);
    }

    #[test]
    fn test_too_long() {
        let raw = "a".repeat(SessionId::MAX_LENGTH + 1);
        assert_eq!(
            SessionId::new(&raw).unwrap_err(),
            InvalidSessionId::TooLong(129)
        );
    }

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(SessionId::new(a.as_str()).is_ok());
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_serde_validates() {
        let id: SessionId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");
        assert!(serde_json::from_str::<SessionId>("\"a/b\"").is_err());
    }
}
