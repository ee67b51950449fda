// ABOUTME: Semantic version parsing and validation.
// ABOUTME: Handles MAJOR.MINOR.PATCH with optional pre-release and build metadata.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticVersionError {
    #[error("semantic version cannot be empty")]
    Empty,

    #[error("expected MAJOR.MINOR.PATCH, got '{0}'")]
    InvalidCore(String),

    #[error("numeric component '{0}' has a leading zero")]
    LeadingZero(String),

    #[error("invalid pre-release identifier '{0}'")]
    InvalidPrerelease(String),

    #[error("invalid build metadata '{0}'")]
    InvalidBuild(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<String>,
    build: Option<String>,
}

impl SemanticVersion {
    pub fn parse(input: &str) -> Result<Self, SemanticVersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SemanticVersionError::Empty);
        }

        let (without_build, build) = match input.split_once('+') {
            Some((before, after)) => (before, Some(after)),
            None => (input, None),
        };
        let (core, pre) = match without_build.split_once('-') {
            Some((before, after)) => (before, Some(after)),
            None => (without_build, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(SemanticVersionError::InvalidCore(core.to_string()));
        };

        if let Some(pre) = pre {
            validate_identifiers(pre, true)
                .map_err(|_| SemanticVersionError::InvalidPrerelease(pre.to_string()))?;
        }
        if let Some(build) = build {
            validate_identifiers(build, false)
                .map_err(|_| SemanticVersionError::InvalidBuild(build.to_string()))?;
        }

        Ok(Self {
            major: parse_numeric(major, core)?,
            minor: parse_numeric(minor, core)?,
            patch: parse_numeric(patch, core)?,
            pre: pre.map(str::to_string),
            build: build.map(str::to_string),
        })
    }

    /// `0.0.0-<pre>`: the marker form for builds without an explicit release version.
    pub fn unreleased(pre: &str) -> Result<Self, SemanticVersionError> {
        Self::parse(&format!("0.0.0-{pre}"))
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn prerelease(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Image tags may not contain `+`, so build metadata is joined with `_`.
    pub fn tag_safe(&self) -> String {
        self.to_string().replace('+', "_")
    }
}

fn parse_numeric(part: &str, core: &str) -> Result<u64, SemanticVersionError> {
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(SemanticVersionError::InvalidCore(core.to_string()));
    }
    if part.len() > 1 && part.starts_with('0') {
        return Err(SemanticVersionError::LeadingZero(part.to_string()));
    }
    part.parse()
        .map_err(|_| SemanticVersionError::InvalidCore(core.to_string()))
}

fn validate_identifiers(value: &str, numeric_no_leading_zero: bool) -> Result<(), ()> {
    for ident in value.split('.') {
        if ident.is_empty() {
            return Err(());
        }
        if !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(());
        }
        let numeric = ident.chars().all(|c| c.is_ascii_digit());
        if numeric_no_leading_zero && numeric && ident.len() > 1 && ident.starts_with('0') {
            return Err(());
        }
    }
    Ok(())
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.pre {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_version() {
        let v = SemanticVersion::parse("1.3.5").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 3, 5));
        assert!(!v.is_prerelease());
        assert_eq!(v.to_string(), "1.3.5");
    }

    #[test]
    fn parses_prerelease_and_build() {
        let v = SemanticVersion::parse("2.0.0-rc.1+exp.sha.5114f85").unwrap();
        assert_eq!(v.prerelease(), Some("rc.1"));
        assert_eq!(v.to_string(), "2.0.0-rc.1+exp.sha.5114f85");
        assert_eq!(v.tag_safe(), "2.0.0-rc.1_exp.sha.5114f85");
    }

    #[test]
    fn unreleased_form_is_prerelease() {
        let v = SemanticVersion::unreleased("abc1234").unwrap();
        assert_eq!(v.to_string(), "0.0.0-abc1234");
        assert!(v.is_prerelease());
    }

    #[test]
    fn rejects_invalid_versions() {
        assert!(matches!(
            SemanticVersion::parse("1.2"),
            Err(SemanticVersionError::InvalidCore(_))
        ));
        assert!(matches!(
            SemanticVersion::parse("v1.2.3"),
            Err(SemanticVersionError::InvalidCore(_))
        ));
        assert!(matches!(
            SemanticVersion::parse("01.2.3"),
            Err(SemanticVersionError::LeadingZero(_))
        ));
        assert!(matches!(
            SemanticVersion::parse("1.2.3-"),
            Err(SemanticVersionError::InvalidPrerelease(_))
        ));
        assert!(matches!(
            SemanticVersion::parse("1.2.3-01"),
            Err(SemanticVersionError::InvalidPrerelease(_))
        ));
        assert!(matches!(
            SemanticVersion::parse("1.2.3+a..b"),
            Err(SemanticVersionError::InvalidBuild(_))
        ));
    }
}
