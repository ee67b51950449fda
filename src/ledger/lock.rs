// ABOUTME: Cross-process lock guarding the ledger file during read-modify-write.
// ABOUTME: An advisory flock on <ledger>.lock; the OS drops it when the holder exits.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::LedgerError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Who holds the ledger lock. Written into the lock file for error messages only;
/// ownership is the flock itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn current() -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// `<ledger>.lock` next to the ledger file.
    pub fn lock_path(ledger: &Path) -> PathBuf {
        let mut name = ledger.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        ledger.with_file_name(name)
    }
}

/// A held ledger lock. Released when dropped or when the process dies.
///
/// The lock file itself is never deleted: unlinking a file another waiter has
/// open would let two processes lock different inodes under one path.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock for `ledger`, waiting up to `timeout` for the holder.
    ///
    /// This blocks the calling thread while it waits.
    pub fn acquire(ledger: &Path, timeout: Duration) -> Result<Self, LedgerError> {
        let path = LockInfo::lock_path(ledger);
        let io_err = |path: &Path, source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        let deadline = Instant::now() + timeout;

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(io_err(&path, e)),
            }
            if Instant::now() >= deadline {
                let holder = read_info(&mut file)
                    .map(|info| format!("{} (pid {}) since {}", info.holder, info.pid, info.started_at))
                    .unwrap_or_else(|| "unknown holder".to_string());
                return Err(LedgerError::LockTimeout { path, holder });
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        write_info(&mut file, &LockInfo::current()).map_err(|e| io_err(&path, e))?;
        tracing::trace!("acquired ledger lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the flock; clearing the info is cosmetic.
        if let Err(e) = self.file.set_len(0) {
            tracing::debug!("could not clear ledger lock info {}: {}", self.path.display(), e);
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn read_info(file: &mut File) -> Option<LockInfo> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_info(file: &mut File, info: &LockInfo) -> std::io::Result<()> {
    let json = serde_json::to_vec(info).map_err(std::io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&json)?;
    file.flush()
}
