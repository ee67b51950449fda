// ABOUTME: Promote command implementation.
// ABOUTME: Moves an artifact one hop along the pipeline, retrying lost ledger races.

use super::{actor_or_default, environment_name, find_artifact, open_ledger};
use crate::cli::ArtifactSource;
use hoist::config::Config;
use hoist::diagnostics::Diagnostics;
use hoist::error::Result;
use hoist::output::Output;
use hoist::promote::{PromoteError, PromoteRequest};
use hoist::retry::{Backoff, with_backoff};

pub struct PromoteArgs<'a> {
    pub source: &'a ArtifactSource,
    pub environment: &'a str,
    pub actor: Option<&'a str>,
    pub skip: bool,
    pub reevaluate: bool,
    pub retries: u32,
}

pub async fn promote(config: &Config, args: PromoteArgs<'_>, mut output: Output) -> Result<()> {
    output.start_timer();

    let ledger = open_ledger(config)?;
    let artifact = find_artifact(args.source, ledger.as_ref())?;
    let target = environment_name(config, args.environment)?;
    let actor = actor_or_default(args.actor, config)?;
    let engine = config.promotion_engine(ledger)?;

    output.progress(&format!(
        "Promoting {} to {} as {}",
        artifact, target, actor
    ));

    let engine = &engine;
    let mut reevaluate = args.reevaluate;
    let (record, diag) = with_backoff(Backoff::new(args.retries), PromoteError::kind, move || {
        let request = PromoteRequest::new(artifact.clone(), target.clone(), actor.clone())
            .skip_ordering(args.skip)
            .reevaluate_gate(reevaluate);
        // A forced re-evaluation is only needed once.
        reevaluate = false;
        async move {
            let mut diag = Diagnostics::default();
            engine
                .promote(request, &mut diag)
                .await
                .map(|record| (record, diag))
        }
    })
    .await?;

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.result(
        &format!(
            "Promoted {} to {} as record {}",
            record.artifact, record.environment, record.seq
        ),
        &record,
    );
    Ok(())
}
