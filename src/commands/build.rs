// ABOUTME: Resolve, build, and push command implementations.
// ABOUTME: Turns a revision into a built artifact file and gets its tags into the registry.

use super::{open_ledger, read_artifact, write_artifact};
use hoist::artifact::Artifact;
use hoist::build::deterministic_tags;
use hoist::config::Config;
use hoist::error::{Error, Result};
use hoist::output::Output;
use hoist::registry::{BollardRegistry, Registry, RegistryError};
use hoist::ledger::Ledger;
use hoist::retry::{Backoff, with_backoff};
use hoist::types::Digest;
use hoist::version;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ResolvedIdentity {
    semantic_version: String,
    source_revision: String,
}

pub fn resolve(revision: &str, version_override: Option<&str>, output: &Output) -> Result<()> {
    let artifact = version::resolve(revision, version_override)?;
    let identity = ResolvedIdentity {
        semantic_version: artifact.semantic_version().to_string(),
        source_revision: artifact.source_revision().to_string(),
    };
    output.result(&identity.semantic_version, &identity);
    Ok(())
}

pub async fn build(
    config: &Config,
    revision: &str,
    version_override: Option<&str>,
    context: Option<PathBuf>,
    push: bool,
    artifact_path: &Path,
    mut output: Output,
) -> Result<()> {
    output.start_timer();

    let resolved = version::resolve(revision, version_override)?;
    let executor = config.build_executor(push)?;
    let context = context.unwrap_or_else(|| config.build.context.clone());
    let options = config.build.options()?;

    output.progress(&format!(
        "Building {} from {}",
        resolved,
        context.display()
    ));
    let built = executor.build(&context, resolved, &options).await?;
    // Written before verification so a pushed image is never left without an artifact file.
    write_artifact(artifact_path, &built)?;

    if push {
        output.progress("  → Verifying pushed digest...");
        let registry = connect_registry(config)?;
        let verified = with_backoff(Backoff::new(2), registry_kind, || {
            registry.verify(executor.repository(), built.digest())
        })
        .await;
        if let Err(e) = verified {
            output.warning(&format!(
                "{} was written but the registry copy is unverified",
                artifact_path.display()
            ));
            return Err(e.into());
        }
    }

    output.success(&format!(
        "Built {} → {}",
        built,
        artifact_path.display()
    ));
    Ok(())
}

pub async fn push(
    config: &Config,
    artifact_path: &Path,
    retries: u32,
    mut output: Output,
) -> Result<()> {
    output.start_timer();

    let artifact = read_artifact(artifact_path)?;
    let repository = config.repository()?;
    let registry = connect_registry(config)?;
    let backoff = Backoff::new(retries);

    let tags =
        deterministic_tags(repository, &artifact).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    for tag in &tags {
        output.progress(&format!("  → Pushing {}...", tag));
        with_backoff(backoff, registry_kind, || registry.push(tag)).await?;
    }

    let first = tags
        .first()
        .ok_or_else(|| Error::InvalidConfig("no tags to push".to_string()))?;
    let pushed = with_backoff(backoff, registry_kind, || {
        registry.pushed_digest(repository, first)
    })
    .await?;
    if &pushed != artifact.digest() {
        adopt_registry_digest(config, artifact_path, &artifact, &pushed, &output)?;
    }

    with_backoff(backoff, registry_kind, || registry.verify(repository, &pushed)).await?;

    output.success(&format!("Pushed {}", repository.pinned(&pushed)));
    Ok(())
}

/// A locally built artifact is known by its image ID until it reaches a
/// registry. Once pushed, rewrite its file with the manifest digest so gates
/// and deploy triggers get a pullable reference. An artifact the ledger
/// already knows keeps its identity.
fn adopt_registry_digest(
    config: &Config,
    artifact_path: &Path,
    artifact: &Artifact,
    pushed: &Digest,
    output: &Output,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    if !ledger.records_for_artifact(artifact.digest())?.is_empty() {
        output.warning(&format!(
            "{} is already in the ledger under local image ID {}; registry digest is {}",
            artifact,
            artifact.digest(),
            pushed
        ));
        return Ok(());
    }

    let registered = Artifact::from_parts(
        pushed.clone(),
        artifact.semantic_version().clone(),
        artifact.source_revision().clone(),
        artifact.built_at(),
    );
    write_artifact(artifact_path, &registered)?;
    tracing::info!(local = %artifact.digest(), registry = %pushed, "artifact now identified by registry digest");
    output.progress(&format!(
        "  → {} now identified by {}",
        artifact_path.display(),
        pushed
    ));
    Ok(())
}

fn registry_kind(e: &RegistryError) -> Option<hoist::error::ErrorKind> {
    Some(e.kind())
}

fn connect_registry(config: &Config) -> Result<BollardRegistry> {
    Ok(BollardRegistry::connect(
        config.registry.socket.as_deref(),
        config.registry.auth()?,
    )?)
}
