// ABOUTME: Application-wide error types and the shared error-kind taxonomy.
// ABOUTME: Uses thiserror; ErrorKind decides what a caller may retry automatically.

use std::path::PathBuf;
use thiserror::Error;

use crate::build::BuildError;
use crate::collab::CollaboratorError;
use crate::gate::GateError;
use crate::ledger::LedgerError;
use crate::promote::PromoteError;
use crate::registry::RegistryError;
use crate::rollback::RollbackError;
use crate::version::VersionError;

/// Failure categories shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRevision,
    ContextNotFound,
    BuildFailed,
    CheckExecutionError,
    PolicyGateRejected,
    OutOfOrderPromotion,
    ApprovalRequired,
    ConcurrentModification,
    RecordNotInHistory,
    RollbackHealthUnconfirmed,
    RegistryUnavailable,
    RegistryRejected,
}

impl ErrorKind {
    /// Infrastructure failures that say nothing about the artifact itself.
    /// Safe for a caller to retry with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::CheckExecutionError
                | ErrorKind::RegistryUnavailable
                | ErrorKind::ConcurrentModification
        )
    }

    /// The operation committed; the caller should follow up manually.
    pub fn is_warning(self) -> bool {
        matches!(self, ErrorKind::RollbackHealthUnconfirmed)
    }

    /// Policy and ordering decisions that need a human or upstream fix.
    pub fn requires_decision(self) -> bool {
        matches!(
            self,
            ErrorKind::OutOfOrderPromotion
                | ErrorKind::ApprovalRequired
                | ErrorKind::PolicyGateRejected
                | ErrorKind::RecordNotInHistory
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRevision => "InvalidRevision",
            ErrorKind::ContextNotFound => "ContextNotFound",
            ErrorKind::BuildFailed => "BuildFailed",
            ErrorKind::CheckExecutionError => "CheckExecutionError",
            ErrorKind::PolicyGateRejected => "PolicyGateRejected",
            ErrorKind::OutOfOrderPromotion => "OutOfOrderPromotion",
            ErrorKind::ApprovalRequired => "ApprovalRequired",
            ErrorKind::ConcurrentModification => "ConcurrentModification",
            ErrorKind::RecordNotInHistory => "RecordNotInHistory",
            ErrorKind::RollbackHealthUnconfirmed => "RollbackHealthUnconfirmed",
            ErrorKind::RegistryUnavailable => "RegistryUnavailable",
            ErrorKind::RegistryRejected => "RegistryRejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("artifact {0} not found in the ledger")]
    ArtifactNotFound(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Promote(#[from] PromoteError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Taxonomy kind for errors that originate in a component.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Version(e) => Some(e.kind()),
            Error::Build(e) => Some(e.kind()),
            Error::Gate(e) => Some(e.kind()),
            Error::Ledger(e) => e.kind(),
            Error::Registry(e) => Some(e.kind()),
            Error::Promote(e) => e.kind(),
            Error::Rollback(e) => e.kind(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_kinds_are_retryable() {
        let retryable: Vec<_> = ALL.iter().filter(|k| k.is_retryable()).collect();
        assert_eq!(
            retryable,
            vec![
                &ErrorKind::CheckExecutionError,
                &ErrorKind::ConcurrentModification,
                &ErrorKind::RegistryUnavailable,
            ]
        );
    }

    #[test]
    fn decision_kinds_are_never_retryable() {
        for kind in ALL.iter().filter(|k| k.requires_decision()) {
            assert!(!kind.is_retryable(), "{kind} must not be retried");
        }
    }

    #[test]
    fn rollback_health_is_the_only_warning() {
        let warnings: Vec<_> = ALL.iter().filter(|k| k.is_warning()).collect();
        assert_eq!(warnings, vec![&ErrorKind::RollbackHealthUnconfirmed]);
    }

    const ALL: [ErrorKind; 12] = [
        ErrorKind::InvalidRevision,
        ErrorKind::ContextNotFound,
        ErrorKind::BuildFailed,
        ErrorKind::CheckExecutionError,
        ErrorKind::PolicyGateRejected,
        ErrorKind::OutOfOrderPromotion,
        ErrorKind::ApprovalRequired,
        ErrorKind::ConcurrentModification,
        ErrorKind::RecordNotInHistory,
        ErrorKind::RollbackHealthUnconfirmed,
        ErrorKind::RegistryUnavailable,
        ErrorKind::RegistryRejected,
    ];
}
