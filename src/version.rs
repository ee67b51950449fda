// ABOUTME: Version resolver: turns a source revision and optional version into an identity.
// ABOUTME: Unversioned builds get a 0.0.0-<short-rev> pre-release, never a release version.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifact::{Artifact, Resolved};
use crate::error::ErrorKind;
use crate::types::{SemanticVersion, SemanticVersionError, SourceRevision, SourceRevisionError};

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid source revision '{revision}': {source}")]
    InvalidRevision {
        revision: String,
        source: SourceRevisionError,
    },

    #[error("invalid version override '{version}': {source}")]
    InvalidVersion {
        version: String,
        source: SemanticVersionError,
    },
}

impl VersionError {
    pub fn kind(&self) -> ErrorKind {
        // Bad overrides share the revision's kind.
        ErrorKind::InvalidRevision
    }
}

/// Resolve the identity for a build of `revision`.
///
/// Pure apart from reading the clock for `built_at`.
pub fn resolve(
    revision: &str,
    version_override: Option<&str>,
) -> Result<Artifact<Resolved>, VersionError> {
    resolve_at(revision, version_override, Utc::now())
}

/// Resolve with an explicit timestamp.
pub fn resolve_at(
    revision: &str,
    version_override: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Artifact<Resolved>, VersionError> {
    let source_revision =
        SourceRevision::new(revision).map_err(|source| VersionError::InvalidRevision {
            revision: revision.to_string(),
            source,
        })?;

    let semantic_version = match version_override.map(str::trim) {
        Some(version) if !version.is_empty() => SemanticVersion::parse(version).map_err(
            |source| VersionError::InvalidVersion {
                version: version.to_string(),
                source,
            },
        )?,
        _ => SemanticVersion::unreleased(source_revision.short()).map_err(|source| {
            VersionError::InvalidVersion {
                version: format!("0.0.0-{}", source_revision.short()),
                source,
            }
        })?,
    };

    tracing::debug!(
        revision = %source_revision,
        version = %semantic_version,
        "resolved artifact identity"
    );

    Ok(Artifact::resolved(semantic_version, source_revision, at))
}
