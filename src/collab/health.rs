// ABOUTME: HTTP health probe for an environment's service endpoint.
// ABOUTME: 2xx means healthy; optionally the reported version must match the artifact.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Method, Uri};
use serde::Deserialize;
use std::time::Duration;

use super::http::{self, parse_url};
use super::{CollaboratorError, HealthProbe, HealthReport};
use crate::artifact::Artifact;
use crate::types::EnvironmentName;

#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    url: Uri,
    timeout: Duration,
    expect_version: bool,
}

#[derive(Deserialize)]
struct VersionBody {
    version: Option<String>,
}

impl HttpHealthProbe {
    pub fn new(url: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            url: parse_url(url)?,
            timeout: Duration::from_secs(5),
            expect_version: false,
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require the JSON body's `version` field to equal the artifact's version.
    pub fn expect_version(mut self, expect: bool) -> Self {
        self.expect_version = expect;
        self
    }

    fn judge(&self, artifact: &Artifact, status: hyper::StatusCode, body: &[u8]) -> HealthReport {
        if !status.is_success() {
            return HealthReport::unhealthy(format!("status {}", status));
        }
        if !self.expect_version {
            return HealthReport::healthy(format!("status {}", status));
        }

        let expected = artifact.semantic_version().to_string();
        match serde_json::from_slice::<VersionBody>(body) {
            Ok(VersionBody {
                version: Some(reported),
            }) if reported == expected => HealthReport::healthy(format!("serving {}", reported)),
            Ok(VersionBody {
                version: Some(reported),
            }) => HealthReport::unhealthy(format!(
                "serving {} but expected {}",
                reported, expected
            )),
            Ok(VersionBody { version: None }) => {
                HealthReport::unhealthy("response has no version field")
            }
            Err(e) => HealthReport::unhealthy(format!("response is not JSON: {}", e)),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(
        &self,
        artifact: &Artifact,
        environment: &EnvironmentName,
    ) -> Result<HealthReport, CollaboratorError> {
        let resp = http::send(Method::GET, &self.url, Bytes::new(), self.timeout).await?;
        let report = self.judge(artifact, resp.status, &resp.body);
        tracing::debug!(%environment, healthy = report.healthy, "health probe: {}", report.detail);
        Ok(report)
    }
}
