// ABOUTME: Observable events emitted after a ledger append commits.
// ABOUTME: Consumed by deployment triggers and by in-process subscribers.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::artifact::Artifact;
use crate::ledger::{PromotionRecord, RecordKind};
use crate::types::{Actor, EnvironmentName, RecordSeq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Promoted,
    RolledBack,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Promoted => f.write_str("promoted"),
            EventKind::RolledBack => f.write_str("rolled_back"),
        }
    }
}

/// `Promoted(artifact, environment)` or its rollback counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionEvent {
    pub kind: EventKind,
    pub artifact: Artifact,
    pub environment: EnvironmentName,
    pub record: RecordSeq,
    pub actor: Actor,
}

impl PromotionEvent {
    pub fn from_record(record: &PromotionRecord) -> Self {
        let kind = match record.kind {
            RecordKind::Promotion => EventKind::Promoted,
            RecordKind::Rollback { .. } => EventKind::RolledBack,
        };
        Self {
            kind,
            artifact: record.artifact.clone(),
            environment: record.environment.clone(),
            record: record.seq,
            actor: record.promoted_by.clone(),
        }
    }

    /// Environment variables describing the event for external scripts.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = artifact_env(&self.artifact, &self.environment);
        env.insert("HOIST_EVENT".to_string(), self.kind.to_string());
        env.insert("HOIST_RECORD".to_string(), self.record.get().to_string());
        env.insert("HOIST_ACTOR".to_string(), self.actor.to_string());
        env
    }
}

/// `HOIST_*` variables identifying an artifact in an environment.
pub fn artifact_env(artifact: &Artifact, environment: &EnvironmentName) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(
        "HOIST_ARTIFACT_DIGEST".to_string(),
        artifact.digest().to_string(),
    );
    env.insert(
        "HOIST_ARTIFACT_VERSION".to_string(),
        artifact.semantic_version().to_string(),
    );
    env.insert(
        "HOIST_ARTIFACT_REVISION".to_string(),
        artifact.source_revision().to_string(),
    );
    env.insert("HOIST_ENVIRONMENT".to_string(), environment.to_string());
    env
}
