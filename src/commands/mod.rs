// ABOUTME: Command module aggregator for the hoist CLI.
// ABOUTME: Shared helpers for loading artifacts, opening the ledger, and picking the actor.

mod build;
mod gate;
mod inspect;
mod promote;
mod rollback;

pub use build::{build, push, resolve};
pub use gate::gate;
pub use inspect::{history, status};
pub use promote::{PromoteArgs, promote};
pub use rollback::{RollbackTarget, rollback};

use hoist::artifact::Artifact;
use hoist::config::Config;
use hoist::error::{Error, Result};
use hoist::ledger::{FileLedger, Ledger};
use hoist::types::{Actor, Digest};
use std::path::Path;
use std::sync::Arc;

use crate::cli::ArtifactSource;

/// How a successful command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    /// A rollback committed but the environment was never seen healthy.
    HealthUnconfirmed,
}

impl Completion {
    pub fn exit_code(self) -> i32 {
        match self {
            Completion::Done => 0,
            Completion::HealthUnconfirmed => 3,
        }
    }
}

pub fn open_ledger(config: &Config) -> Result<Arc<FileLedger>> {
    Ok(Arc::new(FileLedger::open(config.ledger.clone())?))
}

pub fn read_artifact(path: &Path) -> Result<Artifact> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_artifact(path: &Path, artifact: &Artifact) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, json + "\n")?;
    Ok(())
}

/// The artifact named on the command line, from a file or by digest.
pub fn find_artifact<L: Ledger + ?Sized>(source: &ArtifactSource, ledger: &L) -> Result<Artifact> {
    match (&source.artifact, &source.digest) {
        (Some(path), _) => read_artifact(path),
        (None, Some(digest)) => {
            let digest =
                Digest::parse(digest).map_err(|e| Error::InvalidArgument(e.to_string()))?;
            ledger
                .find_artifact(&digest)?
                .ok_or_else(|| Error::ArtifactNotFound(digest.to_string()))
        }
        (None, None) => Err(Error::InvalidArgument(
            "either --artifact or --digest is required".to_string(),
        )),
    }
}

pub fn actor_or_default(actor: Option<&str>, config: &Config) -> Result<Actor> {
    match actor {
        Some(name) => Actor::new(name).map_err(|e| Error::InvalidArgument(e.to_string())),
        None => Ok(config.automation_actor.clone()),
    }
}

pub fn environment_name(config: &Config, name: &str) -> Result<hoist::types::EnvironmentName> {
    Ok(config.environment(name)?.name.clone())
}
