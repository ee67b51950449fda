// ABOUTME: Per-environment deploy trigger and health probe configuration.
// ABOUTME: Builds the collaborator objects the engine and rollback controller call.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::collab::{CommandTrigger, DeployTrigger, HealthProbe, HttpHealthProbe, WebhookTrigger};
use crate::error::{Error, Result};

/// How to deploy a committed promotion: a command or a webhook, not both.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub webhook: Option<String>,

    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(300)
}

impl DeployConfig {
    pub fn trigger(&self) -> Result<Arc<dyn DeployTrigger>> {
        match (&self.command, &self.webhook) {
            (Some(command), None) => {
                Ok(Arc::new(CommandTrigger::new(command).timeout(self.timeout)))
            }
            (None, Some(url)) => Ok(Arc::new(WebhookTrigger::new(url)?.timeout(self.timeout))),
            (Some(_), Some(_)) => Err(Error::InvalidConfig(
                "deploy must set either command or webhook, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidConfig(
                "deploy must set command or webhook".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    pub url: String,

    /// Require the endpoint's JSON `version` to match the artifact.
    #[serde(default)]
    pub expect_version: bool,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

impl HealthConfig {
    pub fn probe(&self) -> Result<Arc<dyn HealthProbe>> {
        let probe = HttpHealthProbe::new(&self.url)?
            .timeout(self.timeout)
            .expect_version(self.expect_version);
        Ok(Arc::new(probe))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackConfig {
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            health_timeout: default_health_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}
