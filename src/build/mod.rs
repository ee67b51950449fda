// ABOUTME: Build executor: turns a resolved artifact into a built one by running the image builder.
// ABOUTME: Owns deterministic tagging, OCI labels, and build metadata injection.

mod docker;

pub use docker::DockerCliBuilder;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::{Artifact, Built, Resolved};
use crate::error::ErrorKind;
use crate::types::{Digest, ImageRepository, ParseImageRepositoryError};

/// Options recognised by every builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Reuse layer cache from these sources.
    pub cache_from: Vec<String>,
    /// Target platforms, e.g. `linux/amd64`.
    pub platforms: Vec<String>,
    pub build_args: BTreeMap<String, String>,
    /// Force a full rebuild.
    pub no_cache: bool,
}

/// Everything a builder needs for one invocation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub context: PathBuf,
    pub dockerfile: Option<PathBuf>,
    pub tags: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub options: BuildOptions,
    /// Push to the registry instead of loading into the local engine.
    pub push: bool,
    pub timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build context not found: {}", path.display())]
    ContextNotFound { path: PathBuf },

    #[error("build failed with exit status {}:\n{output}", status.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    BuildFailed { status: Option<i32>, output: String },

    #[error("build timed out after {limit:?}; the build process group was killed")]
    TimedOut { limit: Duration },

    #[error("failed to start build tool '{tool}': {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("cannot create scratch directory for build results: {source}")]
    Scratch { source: std::io::Error },

    #[error("build tool did not report a usable digest: {reason}")]
    DigestUnavailable { reason: String },

    #[error("invalid image tag: {0}")]
    InvalidTag(#[from] ParseImageRepositoryError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::ContextNotFound { .. } => ErrorKind::ContextNotFound,
            _ => ErrorKind::BuildFailed,
        }
    }
}

/// The external image builder.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Run exactly one build and return the digest it produced.
    async fn build(&self, request: &BuildRequest) -> Result<Digest, BuildError>;
}

/// Tags applied to every build: the version and the source revision.
/// A floating `latest` tag is never produced.
pub fn deterministic_tags<S>(
    repository: &ImageRepository,
    artifact: &Artifact<S>,
) -> Result<Vec<String>, ParseImageRepositoryError> {
    Ok(vec![
        repository.tagged(&artifact.semantic_version().tag_safe())?,
        repository.tagged(&format!("git-{}", artifact.source_revision().short()))?,
    ])
}

fn oci_labels(artifact: &Artifact<Resolved>, created: DateTime<Utc>) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "org.opencontainers.image.version".to_string(),
            artifact.semantic_version().to_string(),
        ),
        (
            "org.opencontainers.image.revision".to_string(),
            artifact.source_revision().to_string(),
        ),
        (
            "org.opencontainers.image.created".to_string(),
            created.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
    ])
}

/// Drives one builder for one repository.
///
/// Never retries: a failed build is reported as-is.
#[derive(Clone)]
pub struct BuildExecutor {
    builder: Arc<dyn ImageBuilder>,
    repository: ImageRepository,
    dockerfile: Option<PathBuf>,
    inject_metadata: bool,
    push: bool,
    timeout: Option<Duration>,
}

impl BuildExecutor {
    pub fn new(builder: Arc<dyn ImageBuilder>, repository: ImageRepository) -> Self {
        Self {
            builder,
            repository,
            dockerfile: None,
            inject_metadata: true,
            push: false,
            timeout: None,
        }
    }

    pub fn dockerfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerfile = Some(path.into());
        self
    }

    /// Pass `APP_VERSION`, `GIT_SHA`, and `BUILD_DATE` as build args.
    pub fn inject_metadata(mut self, inject: bool) -> Self {
        self.inject_metadata = inject;
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Kill the build (and everything it spawned) after `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repository(&self) -> &ImageRepository {
        &self.repository
    }

    /// The request that `build` would send for `artifact`.
    pub fn request(
        &self,
        context: &Path,
        artifact: &Artifact<Resolved>,
        options: &BuildOptions,
    ) -> Result<BuildRequest, BuildError> {
        let started = Utc::now();
        let mut options = options.clone();
        if self.inject_metadata {
            let metadata = [
                ("APP_VERSION", artifact.semantic_version().to_string()),
                ("GIT_SHA", artifact.source_revision().to_string()),
                ("BUILD_DATE", started.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ];
            for (key, value) in metadata {
                options.build_args.entry(key.to_string()).or_insert(value);
            }
        }

        Ok(BuildRequest {
            context: context.to_path_buf(),
            dockerfile: self.dockerfile.clone(),
            tags: deterministic_tags(&self.repository, artifact)?,
            labels: oci_labels(artifact, started),
            options,
            push: self.push,
            timeout: self.timeout,
        })
    }

    /// Build `artifact` from `context`. Version and revision carry over; the
    /// digest and `built_at` come from this build.
    pub async fn build(
        &self,
        context: &Path,
        artifact: Artifact<Resolved>,
        options: &BuildOptions,
    ) -> Result<Artifact<Built>, BuildError> {
        if !context.is_dir() {
            return Err(BuildError::ContextNotFound {
                path: context.to_path_buf(),
            });
        }

        let request = self.request(context, &artifact, options)?;
        tracing::info!(tags = ?request.tags, "building {}", artifact);

        let digest = self.builder.build(&request).await?;
        let built = artifact.into_built(digest, Utc::now());
        tracing::info!("built {}", built);
        Ok(built)
    }
}

impl std::fmt::Debug for BuildExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildExecutor")
            .field("repository", &self.repository)
            .field("push", &self.push)
            .field("timeout", &self.timeout)
            .finish()
    }
}
