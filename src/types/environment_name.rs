// ABOUTME: Environment names as they appear in tags, ledger records and CLI arguments.
// ABOUTME: One lowercase DNS label that starts with a letter and is not a selector keyword.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 63;

/// Words the CLI and ledger output use as selectors or placeholders.
const RESERVED: &[&str] = &["all", "none", "latest", "previous"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentNameError {
    #[error("environment name cannot be empty")]
    Empty,

    #[error("environment name '{name}' is {len} characters; the limit is {MAX_LEN}")]
    TooLong { name: String, len: usize },

    #[error("environment name '{0}' must start with a lowercase letter")]
    BadStart(String),

    #[error("environment name '{0}' cannot end with a hyphen")]
    EndsWithHyphen(String),

    #[error("environment name '{0}' cannot contain consecutive hyphens")]
    DoubleHyphen(String),

    #[error("environment name '{name}' must be lowercase (did you mean '{suggestion}'?)")]
    NotLowercase { name: String, suggestion: String },

    #[error("invalid character '{ch}' at position {at} in environment name '{name}'")]
    InvalidChar { name: String, ch: char, at: usize },

    #[error("'{0}' is reserved and cannot name an environment")]
    Reserved(String),
}

/// Name of a pipeline stage such as `dev` or `eu-west-2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentName(String);

impl EnvironmentName {
    pub fn new(value: &str) -> Result<Self, EnvironmentNameError> {
        let owned = || value.to_string();

        let Some(first) = value.chars().next() else {
            return Err(EnvironmentNameError::Empty);
        };
        if value.len() > MAX_LEN {
            return Err(EnvironmentNameError::TooLong {
                name: owned(),
                len: value.len(),
            });
        }
        if value.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(EnvironmentNameError::NotLowercase {
                name: owned(),
                suggestion: value.to_ascii_lowercase(),
            });
        }
        if !first.is_ascii_lowercase() {
            return Err(EnvironmentNameError::BadStart(owned()));
        }
        if let Some((at, ch)) = value
            .char_indices()
            .find(|&(_, c)| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'))
        {
            return Err(EnvironmentNameError::InvalidChar {
                name: owned(),
                ch,
                at,
            });
        }
        if value.ends_with('-') {
            return Err(EnvironmentNameError::EndsWithHyphen(owned()));
        }
        if value.contains("--") {
            return Err(EnvironmentNameError::DoubleHyphen(owned()));
        }
        if RESERVED.contains(&value) {
            return Err(EnvironmentNameError::Reserved(owned()));
        }

        Ok(Self(owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for EnvironmentName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EnvironmentName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
