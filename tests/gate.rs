// ABOUTME: Integration tests for the policy gate.
// ABOUTME: Checks run to completion, results keep configured order, and infrastructure failures abort.

mod support;

use hoist::error::ErrorKind;
use hoist::gate::{CheckDefinition, CommandCheck, GateError, PolicyGate, Severity};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeCheck, artifact, env, gate};

#[tokio::test]
async fn empty_gate_passes() {
    let result = PolicyGate::default()
        .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
        .await
        .unwrap();
    assert!(result.passed());
    assert!(result.checks_run().is_empty());
}

#[tokio::test]
async fn critical_cve_fails_but_lint_still_runs() {
    let cve = FakeCheck::finding(Severity::Critical);
    let lint = FakeCheck::clean();
    let gate = gate(vec![
        ("critical-cve", Severity::High, cve.clone()),
        ("lint", Severity::Medium, lint.clone()),
    ]);

    let subject = artifact("1.3.5", 'a');
    let result = gate.evaluate(&subject, &env("staging"), None).await.unwrap();

    assert!(!result.passed());
    assert_eq!(lint.calls(), 1);
    let names: Vec<_> = result.checks_run().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["critical-cve", "lint"]);
    let failed: Vec<_> = result.failed_checks().map(|c| c.name.as_str()).collect();
    assert_eq!(failed, vec!["critical-cve"]);
    assert!(result.applies_to(&subject, &env("staging")));
    assert!(!result.applies_to(&subject, &env("prod")));
}

#[tokio::test]
async fn finding_below_threshold_passes() {
    let gate = gate(vec![("lint", Severity::High, FakeCheck::finding(Severity::Medium))]);
    let result = gate
        .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
        .await
        .unwrap();
    assert!(result.passed());
    assert_eq!(result.checks_run()[0].severity, Severity::Medium);
}

#[tokio::test]
async fn check_that_cannot_run_is_an_execution_error() {
    let other = FakeCheck::clean();
    let gate = gate(vec![
        ("scanner", Severity::High, FakeCheck::broken("scanner unreachable")),
        ("lint", Severity::Medium, other.clone()),
    ]);

    let err = gate
        .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
        .await
        .unwrap_err();

    let GateError::CheckExecution {
        check,
        failed,
        total,
        ..
    } = &err;
    assert_eq!(check, "scanner");
    assert_eq!((*failed, *total), (1, 2));
    assert_eq!(err.kind(), ErrorKind::CheckExecutionError);
    assert!(err.kind().is_retryable());
    assert_eq!(other.calls(), 1);
}

mod command {
    use super::*;

    fn single(command: CommandCheck, threshold: Severity) -> PolicyGate {
        PolicyGate::new(vec![CheckDefinition::new(
            "cmd",
            threshold,
            Arc::new(command),
        )])
    }

    #[tokio::test]
    async fn sees_artifact_variables() {
        let check = CommandCheck::new(
            r#"test "$HOIST_ARTIFACT_VERSION" = 1.3.5 && test "$HOIST_ENVIRONMENT" = prod && test -n "$HOIST_IMAGE""#,
        );
        let result = single(check, Severity::Low)
            .evaluate(
                &artifact("1.3.5", 'a'),
                &env("prod"),
                Some("ghcr.io/acme/api@sha256:aaaa"),
            )
            .await
            .unwrap();
        assert!(result.passed(), "{result}");
    }

    #[tokio::test]
    async fn json_report_sets_severity() {
        let check = CommandCheck::new(r#"echo '{"severity":"high","detail":"1 CVE"}'"#);
        let result = single(check, Severity::High)
            .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
            .await
            .unwrap();
        assert!(!result.passed());
        assert_eq!(result.checks_run()[0].detail, "1 CVE");
    }

    #[tokio::test]
    async fn non_zero_exit_uses_failure_severity() {
        let check = CommandCheck::new("exit 1").failure_severity(Severity::Low);
        let result = single(check, Severity::Medium)
            .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
            .await
            .unwrap();
        assert!(result.passed());
        assert_eq!(result.checks_run()[0].severity, Severity::Low);
    }

    #[tokio::test]
    async fn missing_tool_cannot_run() {
        let check = CommandCheck::new("hoist-definitely-not-a-scanner --scan");
        let err = single(check, Severity::High)
            .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CheckExecutionError);
    }

    #[tokio::test]
    async fn timeout_cannot_run() {
        let check = CommandCheck::new("sleep 5").timeout(Duration::from_millis(100));
        let err = single(check, Severity::High)
            .evaluate(&artifact("1.0.0", 'a'), &env("dev"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CheckExecutionError);
    }
}
