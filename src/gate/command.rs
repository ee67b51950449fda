// ABOUTME: Gate check backed by a shell command (scanner, linter, test suite).
// ABOUTME: Exit status or a JSON report line on stdout decides the finding severity.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use super::{Check, CheckContext, CheckError, CheckReport, Severity};
use crate::event::artifact_env;
use crate::process::{ProcessError, run_captured};

/// Shell exit codes meaning "could not run", not "found something".
const NOT_EXECUTABLE: i32 = 126;
const NOT_FOUND: i32 = 127;

/// Runs `sh -c <command>` with `HOIST_*` variables describing the artifact.
///
/// Result interpretation:
/// - the last stdout line, if it is a JSON object `{"severity": ..., "detail": ...}`,
///   is the report;
/// - otherwise exit 0 is a clean result and any other exit status is a finding
///   of `failure_severity`;
/// - spawn failures, timeouts, signals, and exit codes 126/127 mean the check
///   could not run.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    command: String,
    failure_severity: Severity,
    timeout: Option<Duration>,
}

impl CommandCheck {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            failure_severity: Severity::Critical,
            timeout: None,
        }
    }

    pub fn failure_severity(mut self, severity: Severity) -> Self {
        self.failure_severity = severity;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn interpret(&self, code: i32, stdout: &str, stderr: &str) -> CheckReport {
        if let Some(report) = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| serde_json::from_str::<CheckReport>(l.trim()).ok())
        {
            return report;
        }

        if code == 0 {
            CheckReport::clean(stdout.trim())
        } else {
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            CheckReport::finding(
                self.failure_severity,
                format!("exit status {code}: {detail}"),
            )
        }
    }
}

#[async_trait]
impl Check for CommandCheck {
    async fn run(&self, ctx: CheckContext<'_>) -> Result<CheckReport, CheckError> {
        let mut env = artifact_env(ctx.artifact, ctx.environment);
        if let Some(image) = ctx.image {
            env.insert("HOIST_IMAGE".to_string(), image.to_string());
        }

        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.command).envs(&env);

        let output = run_captured(command, self.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut(limit) => {
                    CheckError(format!("'{}' timed out after {:?}", self.command, limit))
                }
                other => CheckError(format!("'{}': {}", self.command, other)),
            })?;

        match output.status.code() {
            None => Err(CheckError(format!(
                "'{}' was terminated by a signal",
                self.command
            ))),
            Some(code @ (NOT_EXECUTABLE | NOT_FOUND)) => Err(CheckError(format!(
                "'{}' could not be executed (exit status {}): {}",
                self.command,
                code,
                output.stderr.trim()
            ))),
            Some(code) => Ok(self.interpret(code, &output.stdout, &output.stderr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_report_wins_over_exit_status() {
        let check = CommandCheck::new("true");
        let report = check.interpret(
            1,
            "scanning...\n{\"severity\":\"medium\",\"detail\":\"2 issues\"}\n",
            "",
        );
        assert_eq!(report, CheckReport::finding(Severity::Medium, "2 issues"));
    }

    #[test]
    fn zero_exit_is_clean() {
        let check = CommandCheck::new("true");
        let report = check.interpret(0, "all good\n", "");
        assert_eq!(report, CheckReport::clean("all good"));
    }

    #[test]
    fn nonzero_exit_uses_failure_severity() {
        let check = CommandCheck::new("false").failure_severity(Severity::High);
        let report = check.interpret(1, "", "CVE-2024-0001\n");
        assert_eq!(report.severity, Severity::High);
        assert!(report.detail.contains("CVE-2024-0001"));
    }
}
