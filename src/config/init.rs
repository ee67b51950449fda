// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented hoist.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ImageRepository;

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, image: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();
    if let Some(i) = image {
        config.image =
            Some(ImageRepository::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?);
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;
    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let image = config
        .image
        .as_ref()
        .map(|i| i.to_string())
        .unwrap_or_default();
    format!(
        r#"image: {image}
ledger: {ledger}
# Promotions by this actor never count as approval.
automation_actor: {actor}

build:
  context: .
  # dockerfile: Dockerfile
  # platforms: [linux/amd64, linux/arm64]
  # cache_from: [type=registry,ref={image}:buildcache]
  # build_args:
  #   PIP_INDEX_URL: {{ env: PIP_INDEX_URL, default: https://pypi.org/simple }}
  # timeout: 20m

# registry:
#   username: {{ env: REGISTRY_USER }}
#   password: {{ env: REGISTRY_TOKEN }}

gate:
  checks: []
  # - name: critical-cve
  #   command: trivy image --exit-code 1 --severity CRITICAL "$HOIST_IMAGE"
  #   threshold: high

# Promotion order is list order.
environments:
  - name: dev
  - name: staging
  - name: prod
    requires_approval: true
    # deploy:
    #   command: ./deploy.sh
    # health:
    #   url: http://prod.internal:8080/healthz
    #   expect_version: true
"#,
        image = image,
        ledger = config.ledger.display(),
        actor = config.automation_actor,
    )
}
