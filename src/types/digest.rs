// ABOUTME: Content digest of a built image, e.g. sha256:<64 hex>.
// ABOUTME: Validates algorithm and hex length so digests can be compared verbatim.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("digest cannot be empty")]
    Empty,

    #[error("digest must have the form <algorithm>:<hex>, got '{0}'")]
    MissingAlgorithm(String),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    InvalidLength {
        algorithm: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid character in digest: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    pub fn parse(input: &str) -> Result<Self, DigestError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DigestError::Empty);
        }

        let (algorithm, hex) = input
            .split_once(':')
            .ok_or_else(|| DigestError::MissingAlgorithm(input.to_string()))?;

        let expected = match algorithm {
            "sha256" => 64,
            "sha512" => 128,
            other => return Err(DigestError::UnsupportedAlgorithm(other.to_string())),
        };

        if let Some(c) = hex
            .chars()
            .find(|c| !c.is_ascii_digit() && !('a'..='f').contains(c))
        {
            return Err(DigestError::InvalidChar(c));
        }

        if hex.len() != expected {
            return Err(DigestError::InvalidLength {
                algorithm: algorithm.to_string(),
                expected,
                actual: hex.len(),
            });
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// First 12 hex characters, the conventional short image ID.
    pub fn short(&self) -> &str {
        &self.hex[..12]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "sha256:4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945";

    #[test]
    fn parses_sha256() {
        let digest = Digest::parse(SHA).unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.short(), "4f53cda18c2b");
        assert_eq!(digest.to_string(), SHA);
    }

    #[test]
    fn rejects_bad_digests() {
        assert_eq!(Digest::parse(""), Err(DigestError::Empty));
        assert!(matches!(
            Digest::parse("4f53cda18c2b"),
            Err(DigestError::MissingAlgorithm(_))
        ));
        assert!(matches!(
            Digest::parse("md5:abcd"),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            Digest::parse("sha256:abcd"),
            Err(DigestError::InvalidLength { actual: 4, .. })
        ));
        assert_eq!(
            Digest::parse(&SHA.to_uppercase().replace("SHA256", "sha256")),
            Err(DigestError::InvalidChar('F'))
        );
    }
}
