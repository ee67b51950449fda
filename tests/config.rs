// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, env var resolution, collaborators, and discovery.

use hoist::config::*;
use hoist::error::Error;
use hoist::gate::Severity;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_full_config() {
        let yaml = r#"
image: ghcr.io/acme/api
ledger: /var/lib/hoist/ledger.json
automation_actor: release-bot
allow_skip: true

build:
  context: app
  dockerfile: docker/Dockerfile
  tool: podman
  platforms: [linux/amd64, linux/arm64]
  cache_from:
    - type=registry,ref=ghcr.io/acme/api:cache
  build_args:
    NODE_ENV: production
  no_cache: true
  timeout: 20m
  inject_metadata: false

registry:
  socket: unix:///run/user/1000/podman/podman.sock

gate:
  checks:
    - name: critical-cve
      command: trivy image --exit-code 1 "$HOIST_IMAGE"
      threshold: high
      failure_severity: critical
      timeout: 5m

environments:
  - dev
  - staging
  - name: prod
    requires_approval: true
    deploy:
      webhook: http://deployer.internal/hooks/prod
      timeout: 2m
    health:
      url: http://api.internal/health
      expect_version: true

rollback:
  health_timeout: 3m
  poll_interval: 10s
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.repository().unwrap().registry(), Some("ghcr.io"));
        assert_eq!(config.ledger, PathBuf::from("/var/lib/hoist/ledger.json"));
        assert_eq!(config.automation_actor.as_str(), "release-bot");
        assert!(config.allow_skip);

        assert_eq!(config.build.tool, "podman");
        assert_eq!(config.build.platforms.len(), 2);
        assert_eq!(config.build.timeout, Some(Duration::from_secs(20 * 60)));
        assert!(!config.build.inject_metadata);
        assert_eq!(
            config.build.build_args.get("NODE_ENV"),
            Some(&EnvValue::Literal("production".to_string()))
        );

        let check = &config.gate.checks[0];
        assert_eq!(check.threshold, Severity::High);
        assert_eq!(check.failure_severity, Severity::Critical);
        assert_eq!(check.timeout, Some(Duration::from_secs(300)));

        let prod = config.environment("prod").unwrap();
        assert!(prod.requires_approval);
        assert_eq!(
            prod.deploy.as_ref().unwrap().timeout,
            Duration::from_secs(120)
        );
        assert!(prod.health.as_ref().unwrap().expect_version);

        assert_eq!(config.rollback.health_timeout, Duration::from_secs(180));
        assert_eq!(config.rollback.poll_interval, Duration::from_secs(10));

        let policy = config.policy();
        assert!(policy.allow_skip);
        assert_eq!(policy.automation_actor.as_str(), "release-bot");
    }

    #[test]
    fn defaults_apply_to_empty_document() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.image.is_none());
        assert!(matches!(config.repository(), Err(Error::InvalidConfig(_))));
        assert_eq!(config.build.tool, "docker");
        assert_eq!(config.build.context, PathBuf::from("."));
        assert_eq!(config.rollback.health_timeout, Duration::from_secs(120));
        assert_eq!(config.pipeline().unwrap().len(), 3);
    }

    #[test]
    fn invalid_image_is_rejected() {
        assert!(Config::from_yaml("image: 'Not A Repo'\n").is_err());
    }

    #[test]
    fn invalid_environment_name_is_rejected() {
        assert!(Config::from_yaml("environments: [dev, 'Prod East']\n").is_err());
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let yaml = "gate:\n  checks:\n    - name: lint\n      command: ./lint.sh\n      threshold: severe\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn check_names_must_be_unique_per_environment() {
        let yaml = r#"
gate:
  checks:
    - name: lint
      command: ./lint.sh
environments:
  - name: dev
    checks:
      - name: lint
        command: ./other-lint.sh
"#;
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(Error::InvalidConfig(_))
        ));
    }
}

mod collaborators {
    use super::*;

    #[test]
    fn deploy_needs_a_target() {
        let yaml = "environments:\n  - name: dev\n    deploy:\n      timeout: 1m\n";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn only_plain_http_urls_are_accepted() {
        let yaml = "environments:\n  - name: dev\n    health:\n      url: https://api.example.com/health\n";
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(Error::Collaborator(_))
        ));
    }

    #[test]
    fn engine_gets_gates_and_triggers() {
        let yaml = r#"
gate:
  checks:
    - name: lint
      command: ./lint.sh
environments:
  - name: dev
    deploy:
      command: ./deploy.sh dev
  - prod
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let ledger = std::sync::Arc::new(hoist::ledger::MemoryLedger::new());
        let engine = config.promotion_engine(ledger).unwrap();

        let dev = config.environment("dev").unwrap().name.clone();
        let prod = config.environment("prod").unwrap().name.clone();
        assert_eq!(engine.gate_for(&dev).map(|g| g.len()), Some(1));
        assert!(engine.trigger_for(&dev).is_some());
        assert!(engine.trigger_for(&prod).is_none());
    }
}

mod env_values {
    use super::*;

    #[test]
    fn build_args_accept_env_references() {
        let yaml = r#"
build:
  build_args:
    NPM_TOKEN:
      env: HOIST_TEST_NPM_TOKEN
    REGION:
      env: HOIST_TEST_MISSING_REGION
      default: eu-west-1
"#;
        let config = Config::from_yaml(yaml).unwrap();

        temp_env::with_var("HOIST_TEST_NPM_TOKEN", Some("s3cret"), || {
            let options = config.build.options().unwrap();
            assert_eq!(options.build_args["NPM_TOKEN"], "s3cret");
            assert_eq!(options.build_args["REGION"], "eu-west-1");
        });
    }

    #[test]
    fn missing_variable_without_default_fails() {
        let mut map = BTreeMap::new();
        map.insert(
            "TOKEN".to_string(),
            EnvValue::FromEnv {
                var: "HOIST_TEST_UNSET_TOKEN".to_string(),
                default: None,
            },
        );

        temp_env::with_var_unset("HOIST_TEST_UNSET_TOKEN", || {
            assert!(matches!(
                resolve_env_map(&map),
                Err(Error::MissingEnvVar(var)) if var == "HOIST_TEST_UNSET_TOKEN"
            ));
        });
    }

    #[test]
    fn registry_credentials_resolve_from_environment() {
        let yaml = r#"
registry:
  server: ghcr.io
  username: acme-ci
  password:
    env: HOIST_TEST_REGISTRY_PASSWORD
"#;
        let config = Config::from_yaml(yaml).unwrap();

        temp_env::with_var("HOIST_TEST_REGISTRY_PASSWORD", Some("hunter2"), || {
            let auth = config.registry.auth().unwrap().unwrap();
            assert_eq!(auth.username, "acme-ci");
            assert_eq!(auth.password, "hunter2");
            assert_eq!(auth.server.as_deref(), Some("ghcr.io"));
        });
    }

    #[test]
    fn registry_credentials_come_in_pairs() {
        let config = Config::from_yaml("registry:\n  username: acme-ci\n").unwrap();
        assert!(matches!(
            config.registry.auth(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(Config::from_yaml("{}").unwrap().registry.auth().unwrap().is_none());
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_hoist_yml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hoist.yml"), "image: acme/api\n").unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.repository().unwrap().path(), "acme/api");
        assert_eq!(config.ledger, dir.path().join(".hoist/ledger.json"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("hoist.yaml"),
            "ledger: /srv/hoist/ledger.json\n",
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.ledger, PathBuf::from("/srv/hoist/ledger.json"));
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("ghcr.io/acme/api"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.repository().unwrap().registry(), Some("ghcr.io"));
        assert!(matches!(
            init_config(dir.path(), None, false),
            Err(Error::AlreadyExists(_))
        ));
    }
}
