// ABOUTME: Image repository parsing, e.g. registry.example.com:5000/team/web.
// ABOUTME: Produces tag and digest references for build tagging and registry pushes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::Digest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseImageRepositoryError {
    #[error("image repository cannot be empty")]
    Empty,

    #[error("invalid character in image repository: {0}")]
    InvalidChar(char),

    #[error("image repository must not carry a tag or digest: {0}")]
    HasTagOrDigest(String),

    #[error("invalid image repository format: {0}")]
    InvalidFormat(String),

    #[error("invalid image tag: {0}")]
    InvalidTag(String),
}

/// A repository without tag or digest. Tags are chosen by the build executor,
/// never taken from configuration, so `latest` cannot sneak in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRepository {
    registry: Option<String>,
    path: String,
}

impl ImageRepository {
    pub fn parse(input: &str) -> Result<Self, ParseImageRepositoryError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRepositoryError::Empty);
        }

        for c in input.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@') {
                return Err(ParseImageRepositoryError::InvalidChar(c));
            }
        }

        if input.contains('@') {
            return Err(ParseImageRepositoryError::HasTagOrDigest(input.to_string()));
        }

        // A registry is present if the first component contains a dot or colon,
        // or is "localhost"
        let (registry, path) = match input.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest)
            }
            _ => (None, input),
        };

        if path.contains(':') {
            return Err(ParseImageRepositoryError::HasTagOrDigest(input.to_string()));
        }

        if path.is_empty()
            || path.split('/').any(|segment| {
                segment.is_empty()
                    || segment.chars().any(|c| c.is_ascii_uppercase())
                    || segment.starts_with(['.', '-', '_'])
            })
        {
            return Err(ParseImageRepositoryError::InvalidFormat(input.to_string()));
        }

        Ok(Self {
            registry,
            path: path.to_string(),
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `<repository>:<tag>`. Tags follow the registry grammar: at most 128
    /// characters of `[A-Za-z0-9_.-]`, not starting with `.` or `-`.
    pub fn tagged(&self, tag: &str) -> Result<String, ParseImageRepositoryError> {
        let valid = !tag.is_empty()
            && tag.len() <= 128
            && !tag.starts_with(['.', '-'])
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid {
            return Err(ParseImageRepositoryError::InvalidTag(tag.to_string()));
        }
        Ok(format!("{self}:{tag}"))
    }

    /// `<repository>@<digest>`: the immutable reference to one artifact.
    pub fn pinned(&self, digest: &Digest) -> String {
        format!("{self}@{digest}")
    }
}

impl fmt::Display for ImageRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.path)
    }
}

impl Serialize for ImageRepository {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ImageRepository {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
