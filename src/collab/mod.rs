// ABOUTME: External collaborators invoked after a ledger append: deployment triggers and health probes.
// ABOUTME: Both are object-safe async traits with command/HTTP implementations.

mod health;
mod http;
mod trigger;

pub use health::HttpHealthProbe;
pub use trigger::{CommandTrigger, WebhookTrigger};

use async_trait::async_trait;
use std::fmt;

use crate::artifact::Artifact;
use crate::event::PromotionEvent;
use crate::types::EnvironmentName;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("'{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Hands a committed promotion or rollback to whatever actually deploys it.
#[async_trait]
pub trait DeployTrigger: Send + Sync {
    async fn trigger(&self, event: &PromotionEvent) -> Result<(), CollaboratorError>;
}

/// What a health probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub detail: String,
}

impl HealthReport {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.healthy { "healthy" } else { "unhealthy" };
        if self.detail.is_empty() {
            f.write_str(state)
        } else {
            write!(f, "{}: {}", state, self.detail)
        }
    }
}

/// Checks whether an environment is serving `artifact` correctly.
///
/// An `Err` means the probe itself could not reach the environment; callers
/// that poll treat it like an unhealthy report and try again.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(
        &self,
        artifact: &Artifact,
        environment: &EnvironmentName,
    ) -> Result<HealthReport, CollaboratorError>;
}
