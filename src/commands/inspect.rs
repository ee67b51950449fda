// ABOUTME: Status and history command implementations.
// ABOUTME: Read-only views of the promotion ledger.

use super::{environment_name, open_ledger};
use hoist::config::Config;
use hoist::error::Result;
use hoist::ledger::{Ledger, LedgerError, PromotionRecord, RecordKind};
use hoist::output::Output;
use serde::Serialize;

#[derive(Serialize)]
struct EnvironmentStatus<'a> {
    environment: &'a str,
    current: Option<PromotionRecord>,
}

/// Current artifact of every configured environment, in pipeline order.
pub fn status(config: &Config, output: &Output) -> Result<()> {
    let ledger = open_ledger(config)?;

    for env in config.pipeline()?.iter() {
        let current = match ledger.current_for(env.name()) {
            Ok(record) => Some(record),
            Err(LedgerError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let line = match &current {
            Some(record) => format!(
                "{:<12} {}  {} by {} at {}",
                env.name().as_str(),
                record.artifact,
                record.seq,
                record.promoted_by,
                record.promoted_at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => format!("{:<12} (empty)", env.name().as_str()),
        };
        output.result(
            &line,
            &EnvironmentStatus {
                environment: env.name().as_str(),
                current,
            },
        );
    }
    Ok(())
}

pub fn history(
    config: &Config,
    environment: &str,
    limit: Option<usize>,
    output: &Output,
) -> Result<()> {
    let environment = environment_name(config, environment)?;
    let ledger = open_ledger(config)?;

    for record in ledger.history_for(&environment)?.take(limit.unwrap_or(usize::MAX)) {
        let record = record?;
        output.result(&describe(&record), &record);
    }
    Ok(())
}

fn describe(record: &PromotionRecord) -> String {
    let action = match record.kind {
        RecordKind::Promotion => "promoted".to_string(),
        RecordKind::Rollback { restored } => format!("rolled back to {}", restored),
    };
    format!(
        "{:<5} {}  {} by {} at {}",
        record.seq.to_string(),
        record.artifact,
        action,
        record.promoted_by,
        record.promoted_at.format("%Y-%m-%d %H:%M:%S")
    )
}
