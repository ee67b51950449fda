// ABOUTME: JSON-file ledger backend shared by every hoist invocation in a repository.
// ABOUTME: Writes hold an advisory file lock and replace the ledger atomically via rename.

use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::lock::StoreLock;
use super::state::LedgerState;
use super::{Ledger, LedgerError, PromotionRecord, RecordDraft};
use crate::gate::GateResult;
use crate::types::{Digest, EnvironmentName, RecordSeq};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Ledger persisted as a single JSON document.
///
/// Readers always see a complete document: writers build the new file next to
/// the old one and rename it into place. A missing file is an empty ledger.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    lock_timeout: Duration,
    writer: Mutex<()>,
}

impl FileLedger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger = Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            writer: Mutex::new(()),
        };
        ledger.load()?;
        Ok(ledger)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<LedgerState, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerState::default());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let state: LedgerState =
            serde_json::from_str(&content).map_err(|e| LedgerError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        state.validate().map_err(|reason| LedgerError::Corrupt {
            path: self.path.clone(),
            reason,
        })?;
        Ok(state)
    }

    fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let json = serde_json::to_vec_pretty(state).map_err(|e| LedgerError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Run `f` on the freshest state while holding both the in-process and
    /// the cross-process lock; persist only if `f` succeeds.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        off_runtime(|| self.modify_locked(f))
    }

    fn modify_locked<T>(
        &self,
        f: impl FnOnce(&mut LedgerState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let _writer = self.writer.lock();
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        let _lock = StoreLock::acquire(&self.path, self.lock_timeout)?;

        let mut state = self.load()?;
        let value = f(&mut state)?;
        self.persist(&state)?;
        Ok(value)
    }
}

/// Lock waits and fsyncs block the thread. On a multi-threaded runtime, tell
/// tokio so other tasks move off this worker.
fn off_runtime<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Ledger for FileLedger {
    fn current_for(&self, environment: &EnvironmentName) -> Result<PromotionRecord, LedgerError> {
        self.load()?.current_for(environment)
    }

    fn record(&self, seq: RecordSeq) -> Result<PromotionRecord, LedgerError> {
        self.load()?.record(seq)
    }

    fn append(
        &self,
        expected_current: Option<RecordSeq>,
        draft: RecordDraft,
    ) -> Result<PromotionRecord, LedgerError> {
        let record = self.modify(|state| state.append(expected_current, draft))?;
        tracing::debug!(
            seq = %record.seq,
            environment = %record.environment,
            "ledger record appended"
        );
        Ok(record)
    }

    fn records_for_artifact(&self, digest: &Digest) -> Result<Vec<PromotionRecord>, LedgerError> {
        Ok(self.load()?.records_for_artifact(digest))
    }

    fn environments(&self) -> Result<Vec<EnvironmentName>, LedgerError> {
        Ok(self.load()?.environments())
    }

    fn latest_gate_result(
        &self,
        digest: &Digest,
        environment: &EnvironmentName,
    ) -> Result<Option<GateResult>, LedgerError> {
        Ok(self.load()?.latest_gate_result(digest, environment))
    }

    fn record_gate_result(&self, result: GateResult) -> Result<(), LedgerError> {
        self.modify(|state| {
            state.record_gate_result(result);
            Ok(())
        })
    }
}
