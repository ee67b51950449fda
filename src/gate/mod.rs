// ABOUTME: Policy gate: runs every configured check against an artifact and decides pass/fail.
// ABOUTME: Checks run concurrently; the result lists every check in configured order.

mod command;

pub use command::CommandCheck;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::artifact::Artifact;
use crate::error::ErrorKind;
use crate::types::EnvironmentName;

/// Finding severity reported by a check, also used as the failure threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Whether a finding of this severity fails a check with `threshold`.
    /// `None` means "no findings" and never fails.
    pub fn breaches(self, threshold: Severity) -> bool {
        self != Severity::None && self >= threshold
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// What a check found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub severity: Severity,
    #[serde(default)]
    pub detail: String,
}

impl CheckReport {
    pub fn clean(detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::None,
            detail: detail.into(),
        }
    }

    pub fn finding(severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            severity,
            detail: detail.into(),
        }
    }
}

/// The check itself could not run (tool missing, timed out, unreachable).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CheckError(pub String);

/// What a check is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub artifact: &'a Artifact,
    pub environment: &'a EnvironmentName,
    /// Pinned image reference (`repo@digest`) when a repository is configured.
    pub image: Option<&'a str>,
}

/// A scan or test tool invoked by the gate.
#[async_trait]
pub trait Check: Send + Sync {
    async fn run(&self, ctx: CheckContext<'_>) -> Result<CheckReport, CheckError>;
}

/// A named check with its failure threshold.
#[derive(Clone)]
pub struct CheckDefinition {
    name: String,
    threshold: Severity,
    check: Arc<dyn Check>,
}

impl CheckDefinition {
    pub fn new(name: impl Into<String>, threshold: Severity, check: Arc<dyn Check>) -> Self {
        Self {
            name: name.into(),
            threshold,
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }
}

impl fmt::Debug for CheckDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckDefinition")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Outcome of one check inside a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub threshold: Severity,
    pub severity: Severity,
    pub passed: bool,
    pub detail: String,
    pub duration_ms: u64,
}

/// Immutable result of one gate evaluation. Re-evaluating produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    artifact: Artifact,
    environment: EnvironmentName,
    checks_run: Vec<CheckRecord>,
    passed: bool,
    evaluated_at: DateTime<Utc>,
}

impl GateResult {
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    pub fn checks_run(&self) -> &[CheckRecord] {
        &self.checks_run
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    /// Checks whose finding met or exceeded their threshold.
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckRecord> {
        self.checks_run.iter().filter(|c| !c.passed)
    }

    /// Whether this result applies to `artifact` promoted into `environment`.
    pub fn applies_to(&self, artifact: &Artifact, environment: &EnvironmentName) -> bool {
        self.artifact.same_image(artifact) && &self.environment == environment
    }
}

impl fmt::Display for GateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self
            .failed_checks()
            .map(|c| format!("{} ({} >= {})", c.name, c.severity, c.threshold))
            .collect();
        if failed.is_empty() {
            write!(f, "{} check(s) passed", self.checks_run.len())
        } else {
            write!(
                f,
                "{} of {} check(s) failed: {}",
                failed.len(),
                self.checks_run.len(),
                failed.join(", ")
            )
        }
    }
}

/// Errors from gate infrastructure, as opposed to a failing policy outcome.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(
        "check '{check}' could not run for {artifact} in {environment}: {reason} ({failed} of {total} check(s) could not run)"
    )]
    CheckExecution {
        check: String,
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        reason: String,
        failed: usize,
        total: usize,
    },
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CheckExecutionError
    }
}

/// Ordered set of checks guarding one environment.
#[derive(Debug, Clone, Default)]
pub struct PolicyGate {
    checks: Vec<CheckDefinition>,
}

impl PolicyGate {
    pub fn new(checks: Vec<CheckDefinition>) -> Self {
        Self { checks }
    }

    pub fn checks(&self) -> &[CheckDefinition] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check and combine the outcomes.
    ///
    /// All checks run to completion even when an earlier one fails, so the
    /// result always lists every configured check. If any check cannot run,
    /// no partial result is produced.
    pub async fn evaluate(
        &self,
        artifact: &Artifact,
        environment: &EnvironmentName,
        image: Option<&str>,
    ) -> Result<GateResult, GateError> {
        let ctx = CheckContext {
            artifact,
            environment,
            image,
        };

        let runs = self.checks.iter().map(|def| async move {
            let started = Instant::now();
            let outcome = def.check.run(ctx).await;
            (def, outcome, started.elapsed())
        });
        let outcomes = join_all(runs).await;

        let mut checks_run = Vec::with_capacity(outcomes.len());
        let mut execution_failures = Vec::new();

        for (def, outcome, elapsed) in outcomes {
            match outcome {
                Ok(report) => {
                    let passed = !report.severity.breaches(def.threshold);
                    tracing::debug!(
                        check = %def.name,
                        severity = %report.severity,
                        threshold = %def.threshold,
                        passed,
                        "gate check finished"
                    );
                    checks_run.push(CheckRecord {
                        name: def.name.clone(),
                        threshold: def.threshold,
                        severity: report.severity,
                        passed,
                        detail: report.detail,
                        duration_ms: elapsed.as_millis() as u64,
                    });
                }
                Err(e) => {
                    tracing::warn!(check = %def.name, "gate check could not run: {}", e);
                    execution_failures.push((def.name.clone(), e.0));
                }
            }
        }

        if let Some((check, reason)) = execution_failures.first().cloned() {
            return Err(GateError::CheckExecution {
                check,
                artifact: Box::new(artifact.clone()),
                environment: environment.clone(),
                reason,
                failed: execution_failures.len(),
                total: self.checks.len(),
            });
        }

        let passed = checks_run.iter().all(|c| c.passed);
        Ok(GateResult {
            artifact: artifact.clone(),
            environment: environment.clone(),
            checks_run,
            passed,
            evaluated_at: Utc::now(),
        })
    }
}
