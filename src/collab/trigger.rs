// ABOUTME: Deployment triggers: a shell command or an HTTP webhook per environment.
// ABOUTME: Both receive the committed promotion event describing what to deploy where.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, Uri};
use std::time::Duration;
use tokio::process::Command;

use super::http::{self, parse_url};
use super::{CollaboratorError, DeployTrigger};
use crate::event::PromotionEvent;
use crate::process::{ProcessError, run_captured};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs `sh -c <command>` with the event exported as `HOIST_*` variables.
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    command: String,
    timeout: Duration,
}

impl CommandTrigger {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DeployTrigger for CommandTrigger {
    async fn trigger(&self, event: &PromotionEvent) -> Result<(), CollaboratorError> {
        tracing::info!(
            environment = %event.environment,
            "running deploy command: {}",
            self.command
        );

        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.command).envs(event.to_env());

        let failed = |reason: String| CollaboratorError::Command {
            command: self.command.clone(),
            reason,
        };
        let output = run_captured(command, Some(self.timeout))
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut(limit) => failed(format!("timed out after {:?}", limit)),
                other => failed(other.to_string()),
            })?;

        if output.success() {
            tracing::debug!("deploy command completed successfully");
            Ok(())
        } else {
            Err(failed(format!(
                "exit status {:?}: {}",
                output.status.code(),
                output.combined().trim()
            )))
        }
    }
}

/// POSTs the event to a URL. Identity fields go in the query string and the
/// full event is the JSON body.
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
    url: Uri,
    timeout: Duration,
}

impl WebhookTrigger {
    pub fn new(url: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            url: parse_url(url)?,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured URL with the event's identity appended as query parameters.
    pub fn request_url(&self, event: &PromotionEvent) -> Result<Uri, CollaboratorError> {
        let params = [
            ("event", event.kind.to_string()),
            ("environment", event.environment.to_string()),
            ("digest", event.artifact.digest().to_string()),
            ("version", event.artifact.semantic_version().to_string()),
            ("revision", event.artifact.source_revision().to_string()),
            ("record", event.record.get().to_string()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let base = self.url.to_string();
        let separator = if self.url.query().is_some() { '&' } else { '?' };
        parse_url(&format!("{base}{separator}{query}"))
    }
}

#[async_trait]
impl DeployTrigger for WebhookTrigger {
    async fn trigger(&self, event: &PromotionEvent) -> Result<(), CollaboratorError> {
        let url = self.request_url(event)?;
        let body = serde_json::to_vec(event).map_err(|e| CollaboratorError::Http {
            url: url.to_string(),
            reason: format!("failed to encode event: {}", e),
        })?;

        let resp = http::send(Method::POST, &url, Bytes::from(body), self.timeout).await?;
        if resp.status.is_success() {
            tracing::debug!(status = %resp.status, "webhook accepted deploy event");
            Ok(())
        } else {
            Err(CollaboratorError::Http {
                url: self.url.to_string(),
                reason: format!(
                    "status {}: {}",
                    resp.status,
                    String::from_utf8_lossy(&resp.body).trim()
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::event::EventKind;
    use crate::types::{Actor, Digest, EnvironmentName, RecordSeq, SemanticVersion, SourceRevision};
    use chrono::Utc;

    fn event() -> PromotionEvent {
        PromotionEvent {
            kind: EventKind::Promoted,
            artifact: Artifact::from_parts(
                Digest::parse(&format!("sha256:{}", "ab".repeat(32))).unwrap(),
                SemanticVersion::parse("1.3.5+build.7").unwrap(),
                SourceRevision::new("abc1234").unwrap(),
                Utc::now(),
            ),
            environment: EnvironmentName::new("staging").unwrap(),
            record: RecordSeq::new(4).unwrap(),
            actor: Actor::new("ci").unwrap(),
        }
    }

    #[test]
    fn webhook_url_encodes_event_identity() {
        let trigger = WebhookTrigger::new("http://deployer.internal/hooks/deploy").unwrap();
        let url = trigger.request_url(&event()).unwrap();
        let query = url.query().unwrap();

        assert_eq!(url.path(), "/hooks/deploy");
        assert!(query.starts_with("event=promoted&environment=staging&digest=sha256%3Aabab"));
        assert!(query.contains("version=1.3.5%2Bbuild.7"));
        assert!(query.ends_with("record=4"));
    }

    #[test]
    fn webhook_url_keeps_existing_query() {
        let trigger = WebhookTrigger::new("http://deployer.internal/deploy?token=x").unwrap();
        let url = trigger.request_url(&event()).unwrap();
        assert!(url.query().unwrap().starts_with("token=x&event=promoted"));
    }

    #[tokio::test]
    async fn command_trigger_exports_event_variables() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deployed");
        let trigger = CommandTrigger::new(format!(
            "echo \"$HOIST_ENVIRONMENT $HOIST_ARTIFACT_VERSION $HOIST_EVENT\" > {}",
            out.display()
        ));

        trigger.trigger(&event()).await.unwrap();
        let written = std::fs::read_to_string(out).unwrap();
        assert_eq!(written.trim(), "staging 1.3.5+build.7 promoted");
    }

    #[tokio::test]
    async fn command_trigger_reports_failure() {
        let err = CommandTrigger::new("echo boom >&2; exit 4")
            .trigger(&event())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
