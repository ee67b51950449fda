// ABOUTME: Image builder backed by the docker (or podman) buildx CLI.
// ABOUTME: Reads the digest from --iidfile, or from --metadata-file when the build pushes.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{BuildError, BuildRequest, ImageBuilder};
use crate::process::{ProcessError, run_captured};
use crate::types::Digest;

/// Runs `<tool> buildx build ...`.
#[derive(Debug, Clone)]
pub struct DockerCliBuilder {
    tool: String,
    scratch_dir: Option<PathBuf>,
}

impl Default for DockerCliBuilder {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCliBuilder {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            scratch_dir: None,
        }
    }

    /// Where the tool's result files go. Defaults to the system temp directory.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Command-line arguments for `request`. The tool writes the image ID to
    /// `iidfile` and its build result metadata to `metadata_file`.
    pub fn arguments(
        &self,
        request: &BuildRequest,
        iidfile: &Path,
        metadata_file: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["buildx".into(), "build".into()];

        if let Some(ref dockerfile) = request.dockerfile {
            args.push("--file".into());
            args.push(request.context.join(dockerfile).into_os_string());
        }
        for tag in &request.tags {
            args.push("--tag".into());
            args.push(tag.into());
        }
        for (key, value) in &request.labels {
            args.push("--label".into());
            args.push(format!("{key}={value}").into());
        }

        let options = &request.options;
        if !options.platforms.is_empty() {
            args.push("--platform".into());
            args.push(options.platforms.join(",").into());
        }
        for source in &options.cache_from {
            args.push("--cache-from".into());
            args.push(source.into());
        }
        for (key, value) in &options.build_args {
            args.push("--build-arg".into());
            args.push(format!("{key}={value}").into());
        }
        if options.no_cache {
            args.push("--no-cache".into());
        }

        args.push(if request.push { "--push" } else { "--load" }.into());
        args.push("--iidfile".into());
        args.push(iidfile.as_os_str().to_owned());
        args.push("--metadata-file".into());
        args.push(metadata_file.as_os_str().to_owned());
        args.push(request.context.as_os_str().to_owned());
        args
    }
}

/// Key buildx uses for the pushed manifest (or index) digest.
const PUSHED_DIGEST_KEY: &str = "containerimage.digest";

/// The digest an image is known by after the build.
///
/// A pushed image is addressed by its registry manifest digest. The image ID
/// is only meaningful to the local engine, and on the classic image store it is
/// the config digest, which no registry serves.
fn reported_digest(push: bool, iidfile: &Path, metadata_file: &Path) -> Result<Digest, BuildError> {
    let (path, raw) = if push {
        let content = read_report(metadata_file)?;
        let metadata: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| BuildError::DigestUnavailable {
                reason: format!("{} is not JSON: {}", metadata_file.display(), e),
            })?;
        let digest = metadata
            .get(PUSHED_DIGEST_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| BuildError::DigestUnavailable {
                reason: format!("{} has no {}", metadata_file.display(), PUSHED_DIGEST_KEY),
            })?;
        (metadata_file, digest.to_string())
    } else {
        (iidfile, read_report(iidfile)?)
    };

    Digest::parse(raw.trim()).map_err(|e| BuildError::DigestUnavailable {
        reason: format!("'{}' in {}: {}", raw.trim(), path.display(), e),
    })
}

fn read_report(path: &Path) -> Result<String, BuildError> {
    std::fs::read_to_string(path).map_err(|e| BuildError::DigestUnavailable {
        reason: format!("cannot read {}: {}", path.display(), e),
    })
}

#[async_trait]
impl ImageBuilder for DockerCliBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<Digest, BuildError> {
        let scratch = match &self.scratch_dir {
            Some(dir) => tempfile::tempdir_in(dir),
            None => tempfile::tempdir(),
        }
        .map_err(|source| BuildError::Scratch { source })?;
        let iidfile = scratch.path().join("iid");
        let metadata_file = scratch.path().join("metadata.json");

        let mut command = Command::new(&self.tool);
        command.args(self.arguments(request, &iidfile, &metadata_file));
        tracing::debug!(tool = %self.tool, "starting image build");

        let output = run_captured(command, request.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut(limit) => BuildError::TimedOut { limit },
                ProcessError::Spawn(source) | ProcessError::Wait(source) => BuildError::Spawn {
                    tool: self.tool.clone(),
                    source,
                },
            })?;

        if !output.success() {
            return Err(BuildError::BuildFailed {
                status: output.status.code(),
                output: output.combined(),
            });
        }

        reported_digest(request.push, &iidfile, &metadata_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildOptions;
    use std::collections::BTreeMap;

    fn request() -> BuildRequest {
        BuildRequest {
            context: PathBuf::from("/src/app"),
            dockerfile: Some(PathBuf::from("Dockerfile.prod")),
            tags: vec!["acme/api:1.0.0".to_string(), "acme/api:git-abc1234".to_string()],
            labels: BTreeMap::from([(
                "org.opencontainers.image.version".to_string(),
                "1.0.0".to_string(),
            )]),
            options: BuildOptions {
                cache_from: vec!["type=registry,ref=acme/api:cache".to_string()],
                platforms: vec!["linux/amd64".to_string(), "linux/arm64".to_string()],
                build_args: BTreeMap::from([("APP_VERSION".to_string(), "1.0.0".to_string())]),
                no_cache: true,
            },
            push: true,
            timeout: None,
        }
    }

    #[test]
    fn arguments_cover_every_option() {
        let args: Vec<String> = DockerCliBuilder::default()
            .arguments(&request(), Path::new("/tmp/iid"), Path::new("/tmp/meta.json"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "buildx",
                "build",
                "--file",
                "/src/app/Dockerfile.prod",
                "--tag",
                "acme/api:1.0.0",
                "--tag",
                "acme/api:git-abc1234",
                "--label",
                "org.opencontainers.image.version=1.0.0",
                "--platform",
                "linux/amd64,linux/arm64",
                "--cache-from",
                "type=registry,ref=acme/api:cache",
                "--build-arg",
                "APP_VERSION=1.0.0",
                "--no-cache",
                "--push",
                "--iidfile",
                "/tmp/iid",
                "--metadata-file",
                "/tmp/meta.json",
                "/src/app",
            ]
        );
    }

    #[test]
    fn never_tags_latest() {
        let args = DockerCliBuilder::default().arguments(
            &request(),
            Path::new("/tmp/iid"),
            Path::new("/tmp/meta.json"),
        );
        assert!(!args.iter().any(|a| a.to_string_lossy().ends_with(":latest")));
    }

    #[test]
    fn pushed_builds_use_the_manifest_digest() {
        let dir = tempfile::tempdir().unwrap();
        let iidfile = dir.path().join("iid");
        let metadata = dir.path().join("metadata.json");
        let config = format!("sha256:{}", "c".repeat(64));
        let manifest = format!("sha256:{}", "d".repeat(64));
        std::fs::write(&iidfile, &config).unwrap();
        std::fs::write(
            &metadata,
            format!(r#"{{"containerimage.config.digest":"{config}","containerimage.digest":"{manifest}"}}"#),
        )
        .unwrap();

        assert_eq!(reported_digest(true, &iidfile, &metadata).unwrap().to_string(), manifest);
        assert_eq!(reported_digest(false, &iidfile, &metadata).unwrap().to_string(), config);

        std::fs::write(&metadata, "{}").unwrap();
        assert!(matches!(
            reported_digest(true, &iidfile, &metadata),
            Err(BuildError::DigestUnavailable { .. })
        ));
    }
}
