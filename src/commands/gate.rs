// ABOUTME: Gate command implementation.
// ABOUTME: Evaluates an environment's checks for an artifact and stores the result.

use super::{environment_name, find_artifact, open_ledger};
use crate::cli::ArtifactSource;
use hoist::config::Config;
use hoist::error::Result;
use hoist::output::Output;
use hoist::promote::PromoteError;

pub async fn gate(
    config: &Config,
    source: &ArtifactSource,
    environment: &str,
    mut output: Output,
) -> Result<()> {
    output.start_timer();

    let ledger = open_ledger(config)?;
    let artifact = find_artifact(source, ledger.as_ref())?;
    let environment = environment_name(config, environment)?;
    let engine = config.promotion_engine(ledger)?;

    output.progress(&format!(
        "Evaluating gate for {} entering {}",
        artifact, environment
    ));
    let result = engine.evaluate_gate(&artifact, &environment).await?;

    for check in result.checks_run() {
        output.progress(&format!(
            "  {} {}: {} ({})",
            if check.passed { "✓" } else { "✗" },
            check.name,
            check.severity,
            check.detail
        ));
    }

    if !result.passed() {
        return Err(PromoteError::GateRejected {
            artifact: Box::new(artifact),
            environment,
            result: Box::new(result),
        }
        .into());
    }

    output.result(&format!("Gate passed: {}", result), &result);
    Ok(())
}
