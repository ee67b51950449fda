// ABOUTME: Source revision (VCS commit identifier) validation.
// ABOUTME: Accepts 7 to 64 hex characters and normalizes to lowercase.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MIN_LEN: usize = 7;
const MAX_LEN: usize = 64;
const SHORT_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceRevisionError {
    #[error("source revision cannot be empty")]
    Empty,

    #[error("source revision must be at least {MIN_LEN} characters, got {0}")]
    TooShort(usize),

    #[error("source revision exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("invalid character in source revision: '{0}' (expected hex digits)")]
    InvalidChar(char),
}

/// A commit identifier from version control, e.g. a git SHA.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRevision(String);

impl SourceRevision {
    pub fn new(value: &str) -> Result<Self, SourceRevisionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SourceRevisionError::Empty);
        }

        if let Some(c) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(SourceRevisionError::InvalidChar(c));
        }

        if value.len() < MIN_LEN {
            return Err(SourceRevisionError::TooShort(value.len()));
        }

        if value.len() > MAX_LEN {
            return Err(SourceRevisionError::TooLong);
        }

        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in pre-release versions and image tags.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN]
    }
}

impl fmt::Display for SourceRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SourceRevision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SourceRevision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
