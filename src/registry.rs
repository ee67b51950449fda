// ABOUTME: Registry collaborator: push built images and verify their digests remotely.
// ABOUTME: Implemented over the Docker Engine API with bollard.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::query_parameters::PushImageOptions;
use futures::StreamExt;

use crate::error::ErrorKind;
use crate::types::{Digest, ImageRepository};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable for {reference}: {reason}")]
    Unavailable { reference: String, reason: String },

    #[error("registry rejected {reference}: {reason}")]
    Rejected { reference: String, reason: String },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Unavailable { .. } => ErrorKind::RegistryUnavailable,
            RegistryError::Rejected { .. } => ErrorKind::RegistryRejected,
        }
    }

    fn from_bollard(reference: &str, e: bollard::errors::Error) -> Self {
        match &e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 401 | 403,
                message,
            } => RegistryError::Rejected {
                reference: reference.to_string(),
                reason: message.clone(),
            },
            _ => RegistryError::Unavailable {
                reference: reference.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

/// Username/password for the target registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server: Option<String>,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Push the local image tagged `reference` (`repo:tag`).
    async fn push(&self, reference: &str) -> Result<(), RegistryError>;

    /// The manifest digest the registry assigned to a pushed `reference`.
    ///
    /// This differs from the local image ID on engines that store images by
    /// config digest, so it is what `verify` and pinned references must use.
    async fn pushed_digest(
        &self,
        repository: &ImageRepository,
        reference: &str,
    ) -> Result<Digest, RegistryError>;

    /// Confirm the registry holds `repository@digest`.
    async fn verify(&self, repository: &ImageRepository, digest: &Digest)
    -> Result<(), RegistryError>;
}

pub struct BollardRegistry {
    client: Docker,
    auth: Option<RegistryAuth>,
}

impl BollardRegistry {
    pub fn new(client: Docker, auth: Option<RegistryAuth>) -> Self {
        Self { client, auth }
    }

    /// Connect to the engine at `socket`, or the platform default when `None`.
    pub fn connect(socket: Option<&str>, auth: Option<RegistryAuth>) -> Result<Self, RegistryError> {
        let client = match socket {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RegistryError::Unavailable {
            reference: socket.unwrap_or("default engine socket").to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(client, auth))
    }

    fn credentials(&self) -> Option<DockerCredentials> {
        self.auth.as_ref().map(|a| DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        })
    }
}

impl std::fmt::Debug for BollardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BollardRegistry")
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

/// Split `repo:tag` at the tag separator (a `:` after the last `/`).
fn split_reference(reference: &str) -> (&str, Option<&str>) {
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let at = name_start + i;
            (&reference[..at], Some(&reference[at + 1..]))
        }
        None => (reference, None),
    }
}

/// Pick `repository`'s entry out of an image's `RepoDigests`.
fn repo_digest(repository: &ImageRepository, repo_digests: &[String]) -> Option<Digest> {
    let prefix = format!("{repository}@");
    repo_digests
        .iter()
        .filter_map(|entry| entry.strip_prefix(&prefix))
        .find_map(|digest| Digest::parse(digest).ok())
}

#[async_trait]
impl Registry for BollardRegistry {
    async fn push(&self, reference: &str) -> Result<(), RegistryError> {
        let (name, tag) = split_reference(reference);
        let opts = PushImageOptions {
            tag: tag.map(str::to_string),
            ..Default::default()
        };

        tracing::info!("pushing {}", reference);
        let mut stream = self.client.push_image(name, Some(opts), self.credentials());
        while let Some(result) = stream.next().await {
            result.map_err(|e| RegistryError::from_bollard(reference, e))?;
        }
        Ok(())
    }

    async fn pushed_digest(
        &self,
        repository: &ImageRepository,
        reference: &str,
    ) -> Result<Digest, RegistryError> {
        let inspect = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| RegistryError::from_bollard(reference, e))?;
        repo_digest(repository, inspect.repo_digests.as_deref().unwrap_or_default()).ok_or_else(
            || RegistryError::Unavailable {
                reference: reference.to_string(),
                reason: format!("engine recorded no registry digest for {repository}"),
            },
        )
    }

    async fn verify(
        &self,
        repository: &ImageRepository,
        digest: &Digest,
    ) -> Result<(), RegistryError> {
        let reference = repository.pinned(digest);
        let inspect = self
            .client
            .inspect_registry_image(&reference, self.credentials())
            .await
            .map_err(|e| RegistryError::from_bollard(&reference, e))?;

        match inspect.descriptor.digest.as_deref() {
            Some(remote) if remote == digest.to_string() => Ok(()),
            Some(remote) => Err(RegistryError::Rejected {
                reference,
                reason: format!("registry reports digest {}", remote),
            }),
            None => Err(RegistryError::Unavailable {
                reference,
                reason: "registry returned no digest".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reference_handles_registry_port() {
        assert_eq!(
            split_reference("localhost:5000/shop/api:1.3.5"),
            ("localhost:5000/shop/api", Some("1.3.5"))
        );
        assert_eq!(
            split_reference("localhost:5000/shop/api"),
            ("localhost:5000/shop/api", None)
        );
        assert_eq!(split_reference("api:git-abc1234"), ("api", Some("git-abc1234")));
    }

    #[test]
    fn repo_digest_matches_the_pushed_repository() {
        let repo = ImageRepository::parse("ghcr.io/acme/api").unwrap();
        let manifest = format!("sha256:{}", "9".repeat(64));
        let entries = vec![
            format!("ghcr.io/acme/api-cache@sha256:{}", "1".repeat(64)),
            format!("ghcr.io/acme/api@{manifest}"),
        ];
        assert_eq!(
            repo_digest(&repo, &entries).map(|d| d.to_string()),
            Some(manifest)
        );
        assert_eq!(repo_digest(&repo, &entries[..1]), None);
        assert_eq!(repo_digest(&repo, &[]), None);
    }

    #[test]
    fn auth_failures_are_rejections() {
        let err = RegistryError::from_bollard(
            "ghcr.io/acme/api:1.0.0",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 401,
                message: "unauthorized".to_string(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::RegistryRejected);

        let err = RegistryError::from_bollard(
            "ghcr.io/acme/api:1.0.0",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "internal".to_string(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::RegistryUnavailable);
    }
}
