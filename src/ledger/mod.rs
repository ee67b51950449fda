// ABOUTME: Promotion ledger: append-only record of which artifact is current in which environment.
// ABOUTME: Records form a per-environment back-linked history; appends use compare-and-swap.

mod file;
mod lock;
mod memory;
mod state;

pub use file::FileLedger;
pub use lock::{LockInfo, StoreLock};
pub use memory::MemoryLedger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::artifact::Artifact;
use crate::error::ErrorKind;
use crate::gate::GateResult;
use crate::types::{Actor, Digest, EnvironmentName, RecordSeq};

/// Why a record was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    Promotion,
    /// Restores the artifact of an earlier record in the same environment.
    Rollback { restored: RecordSeq },
}

impl RecordKind {
    pub fn is_rollback(&self) -> bool {
        matches!(self, RecordKind::Rollback { .. })
    }
}

/// One ledger entry. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub seq: RecordSeq,
    pub environment: EnvironmentName,
    /// Owned copy of the identity; stays valid if the image is deleted.
    pub artifact: Artifact,
    pub promoted_at: DateTime<Utc>,
    pub promoted_by: Actor,
    /// The record that was current in this environment before this one.
    pub previous: Option<RecordSeq>,
    pub kind: RecordKind,
}

/// A record before the ledger assigns its sequence number and links.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub environment: EnvironmentName,
    pub artifact: Artifact,
    pub promoted_by: Actor,
    pub kind: RecordKind,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("environment {environment} has never received a promotion")]
    NotFound { environment: EnvironmentName },

    #[error("ledger has no record {0}")]
    UnknownRecord(RecordSeq),

    #[error(
        "concurrent modification of {environment}: expected current record {}, found {}",
        describe(*expected),
        describe(*actual)
    )]
    ConcurrentModification {
        environment: EnvironmentName,
        expected: Option<RecordSeq>,
        actual: Option<RecordSeq>,
    },

    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ledger at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("timed out waiting for ledger lock {path} held by {holder}")]
    LockTimeout { path: PathBuf, holder: String },
}

fn describe(seq: Option<RecordSeq>) -> String {
    seq.map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl LedgerError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LedgerError::ConcurrentModification { .. } => Some(ErrorKind::ConcurrentModification),
            _ => None,
        }
    }
}

/// Durable storage of promotion records.
///
/// Implementations must make `append` an atomic compare-and-swap of the
/// environment's current pointer: it succeeds only if the current record is
/// still `expected_current`.
pub trait Ledger: Send + Sync {
    /// The most recent record for `environment`, or `NotFound`.
    fn current_for(&self, environment: &EnvironmentName) -> Result<PromotionRecord, LedgerError>;

    /// Look up a record by sequence number.
    fn record(&self, seq: RecordSeq) -> Result<PromotionRecord, LedgerError>;

    /// Append `draft` as the new current record of its environment.
    fn append(
        &self,
        expected_current: Option<RecordSeq>,
        draft: RecordDraft,
    ) -> Result<PromotionRecord, LedgerError>;

    /// Every record of the artifact with `digest`, oldest first.
    fn records_for_artifact(&self, digest: &Digest) -> Result<Vec<PromotionRecord>, LedgerError>;

    /// Environments that have a current record.
    fn environments(&self) -> Result<Vec<EnvironmentName>, LedgerError>;

    /// Newest gate result for the artifact in `environment`.
    fn latest_gate_result(
        &self,
        digest: &Digest,
        environment: &EnvironmentName,
    ) -> Result<Option<GateResult>, LedgerError>;

    /// Store a gate result. Results are appended, never replaced.
    fn record_gate_result(&self, result: GateResult) -> Result<(), LedgerError>;

    /// Records of `environment`, newest first.
    fn history_for(&self, environment: &EnvironmentName) -> Result<History<'_, Self>, LedgerError>
    where
        Self: Sized,
    {
        History::new(self, environment)
    }

    /// Any stored copy of the artifact with `digest`.
    fn find_artifact(&self, digest: &Digest) -> Result<Option<Artifact>, LedgerError> {
        Ok(self
            .records_for_artifact(digest)?
            .into_iter()
            .next()
            .map(|r| r.artifact))
    }
}

/// Lazy walk of an environment's history along `previous` links.
///
/// The head is fixed when the walk is created, so the sequence is finite and
/// `restart` replays exactly the same records even if appends happen meanwhile.
pub struct History<'a, L: ?Sized> {
    ledger: &'a L,
    head: Option<RecordSeq>,
    next: Option<RecordSeq>,
}

impl<'a, L: Ledger + ?Sized> History<'a, L> {
    pub fn new(ledger: &'a L, environment: &EnvironmentName) -> Result<Self, LedgerError> {
        let head = match ledger.current_for(environment) {
            Ok(record) => Some(record.seq),
            Err(LedgerError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(Self::from_head(ledger, head))
    }

    /// Walk starting at `head` (inclusive).
    pub fn from_head(ledger: &'a L, head: Option<RecordSeq>) -> Self {
        Self {
            ledger,
            head,
            next: head,
        }
    }

    pub fn head(&self) -> Option<RecordSeq> {
        self.head
    }

    /// Rewind to the head captured at creation.
    pub fn restart(&mut self) {
        self.next = self.head;
    }
}

impl<L: ?Sized> Clone for History<'_, L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger,
            head: self.head,
            next: self.next,
        }
    }
}

impl<L: Ledger + ?Sized> Iterator for History<'_, L> {
    type Item = Result<PromotionRecord, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let seq = self.next?;
        match self.ledger.record(seq) {
            Ok(record) => {
                self.next = record.previous;
                Some(Ok(record))
            }
            Err(e) => {
                self.next = None;
                Some(Err(e))
            }
        }
    }
}
