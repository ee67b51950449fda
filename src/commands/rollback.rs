// ABOUTME: Rollback command implementation.
// ABOUTME: Restores an earlier artifact in an environment and reports whether it came up healthy.

use super::{Completion, actor_or_default, environment_name, open_ledger};
use hoist::config::Config;
use hoist::diagnostics::Diagnostics;
use hoist::error::{Error, Result};
use hoist::output::Output;
use hoist::retry::{Backoff, with_backoff};
use hoist::rollback::{RollbackError, RollbackOutcome};
use hoist::types::RecordSeq;
use std::sync::Arc;

/// Which record to restore.
#[derive(Debug, Clone, Copy)]
pub enum RollbackTarget {
    Record(u64),
    /// The newest earlier record with a different artifact.
    Previous,
}

pub async fn rollback(
    config: &Config,
    environment: &str,
    target: RollbackTarget,
    actor: Option<&str>,
    retries: u32,
    mut output: Output,
) -> Result<Completion> {
    output.start_timer();

    let environment = environment_name(config, environment)?;
    let actor = actor_or_default(actor, config)?;
    let ledger = open_ledger(config)?;
    let engine = Arc::new(config.promotion_engine(ledger)?);
    let controller = config.rollback_controller(engine)?;

    let fixed = match target {
        RollbackTarget::Record(seq) => Some(RecordSeq::new(seq).ok_or_else(|| {
            Error::InvalidArgument(format!("record numbers start at 1, got {seq}"))
        })?),
        RollbackTarget::Previous => None,
    };

    output.progress(&format!("Rolling back {} as {}", environment, actor));

    let controller = &controller;
    let environment = &environment;
    let (report, diag) = with_backoff(Backoff::new(retries), RollbackError::kind, move || {
        let actor = actor.clone();
        async move {
            let record = match fixed {
                Some(seq) => seq,
                None => controller.previous_distinct(environment)?.seq,
            };
            let mut diag = Diagnostics::default();
            controller
                .rollback_to(environment, record, actor, &mut diag)
                .await
                .map(|report| (report, diag))
        }
    })
    .await?;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let summary = format!(
        "Rolled back {} to {} as record {}",
        report.record.environment, report.record.artifact, report.record.seq
    );
    output.result(&summary, &report.record);

    Ok(match report.outcome {
        RollbackOutcome::Confirmed { detail } => {
            output.progress(&format!("  ✓ Healthy: {}", detail));
            Completion::Done
        }
        RollbackOutcome::HealthUnconfirmed { .. } => Completion::HealthUnconfirmed,
    })
}
