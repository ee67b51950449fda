// ABOUTME: Artifact identity parameterized by build state.
// ABOUTME: Resolved artifacts have no digest yet; only Built artifacts can be promoted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::types::{Digest, SemanticVersion, SourceRevision};

/// Identity computed before the build runs. Carries no digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolved;

/// Identity of an image the build tool produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Built {
    digest: Digest,
}

/// Immutable identity of one container image.
///
/// The state parameter makes "has a digest" a compile-time fact: the gate,
/// the promotion engine, and the ledger only accept `Artifact<Built>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact<S = Built> {
    semantic_version: SemanticVersion,
    source_revision: SourceRevision,
    built_at: DateTime<Utc>,
    state: S,
}

impl<S> Artifact<S> {
    pub fn semantic_version(&self) -> &SemanticVersion {
        &self.semantic_version
    }

    pub fn source_revision(&self) -> &SourceRevision {
        &self.source_revision
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

impl Artifact<Resolved> {
    pub(crate) fn resolved(
        semantic_version: SemanticVersion,
        source_revision: SourceRevision,
        at: DateTime<Utc>,
    ) -> Self {
        Artifact {
            semantic_version,
            source_revision,
            built_at: at,
            state: Resolved,
        }
    }

    /// Attach the digest reported by the build tool. Version and revision carry
    /// over untouched; `built_at` is the completion time of the build.
    pub(crate) fn into_built(self, digest: Digest, built_at: DateTime<Utc>) -> Artifact<Built> {
        Artifact {
            semantic_version: self.semantic_version,
            source_revision: self.source_revision,
            built_at,
            state: Built { digest },
        }
    }
}

impl Artifact<Built> {
    /// Reassemble an identity from stored fields (artifact files, ledger entries).
    pub fn from_parts(
        digest: Digest,
        semantic_version: SemanticVersion,
        source_revision: SourceRevision,
        built_at: DateTime<Utc>,
    ) -> Self {
        Artifact {
            semantic_version,
            source_revision,
            built_at,
            state: Built { digest },
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.state.digest
    }

    /// Two artifacts are the same image iff their digests match.
    pub fn same_image(&self, other: &Artifact) -> bool {
        self.digest() == other.digest()
    }
}

impl fmt::Display for Artifact<Built> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.semantic_version,
            self.state.digest.algorithm(),
            self.state.digest.short()
        )
    }
}

impl fmt::Display for Artifact<Resolved> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (unbuilt @{})", self.semantic_version, self.source_revision.short())
    }
}

/// Stored form of a built artifact.
#[derive(Serialize, Deserialize)]
struct ArtifactDocument {
    digest: Digest,
    semantic_version: SemanticVersion,
    source_revision: SourceRevision,
    built_at: DateTime<Utc>,
}

impl Serialize for Artifact<Built> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ArtifactDocument {
            digest: self.state.digest.clone(),
            semantic_version: self.semantic_version.clone(),
            source_revision: self.source_revision.clone(),
            built_at: self.built_at,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Artifact<Built> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = ArtifactDocument::deserialize(deserializer)?;
        Ok(Artifact::from_parts(
            doc.digest,
            doc.semantic_version,
            doc.source_revision,
            doc.built_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "sha256:4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945";

    fn resolved() -> Artifact<Resolved> {
        Artifact::resolved(
            SemanticVersion::parse("1.3.5").unwrap(),
            SourceRevision::new("abc1234").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn building_keeps_version_and_revision() {
        let before = resolved();
        let finished = Utc::now();
        let built = before
            .clone()
            .into_built(Digest::parse(SHA).unwrap(), finished);

        assert_eq!(built.semantic_version(), before.semantic_version());
        assert_eq!(built.source_revision(), before.source_revision());
        assert_eq!(built.built_at(), finished);
        assert_eq!(built.digest().to_string(), SHA);
    }

    #[test]
    fn display_uses_short_digest() {
        let built = resolved().into_built(Digest::parse(SHA).unwrap(), Utc::now());
        assert_eq!(built.to_string(), "1.3.5 (sha256:4f53cda18c2b)");
    }

    #[test]
    fn json_round_trip_preserves_identity() {
        let built = resolved().into_built(Digest::parse(SHA).unwrap(), Utc::now());
        let json = serde_json::to_string(&built).unwrap();
        assert!(json.contains("\"semantic_version\":\"1.3.5\""));
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, built);
    }
}
