// ABOUTME: Configuration types and parsing for hoist.yml.
// ABOUTME: Describes the image, build, gate checks, and the ordered environment pipeline.

mod collab;
mod deserialize;
mod env_value;
mod init;

pub use collab::{DeployConfig, HealthConfig, RollbackConfig};
pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;

use deserialize::{
    deserialize_actor, deserialize_environment_name, deserialize_environments,
    deserialize_repository_option,
};

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::build::{BuildExecutor, BuildOptions, DockerCliBuilder, ImageBuilder};
use crate::environment::Pipeline;
use crate::error::{Error, Result};
use crate::gate::{CheckDefinition, CommandCheck, PolicyGate, Severity};
use crate::ledger::Ledger;
use crate::promote::{PromotionEngine, PromotionPolicy};
use crate::registry::RegistryAuth;
use crate::rollback::RollbackController;
use crate::types::{Actor, EnvironmentName, ImageRepository};

pub const CONFIG_FILENAME: &str = "hoist.yml";
pub const CONFIG_FILENAME_ALT: &str = "hoist.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".hoist/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Repository every build is tagged into, e.g. `ghcr.io/acme/api`.
    #[serde(default, deserialize_with = "deserialize_repository_option")]
    pub image: Option<ImageRepository>,

    #[serde(default = "default_ledger")]
    pub ledger: PathBuf,

    #[serde(default = "default_automation_actor", deserialize_with = "deserialize_actor")]
    pub automation_actor: Actor,

    #[serde(default)]
    pub allow_skip: bool,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default = "default_environments", deserialize_with = "deserialize_environments")]
    pub environments: NonEmpty<EnvironmentConfig>,

    #[serde(default)]
    pub rollback: RollbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Relative to the context.
    #[serde(default)]
    pub dockerfile: Option<PathBuf>,

    #[serde(default = "default_tool")]
    pub tool: String,

    #[serde(default)]
    pub platforms: Vec<String>,

    #[serde(default)]
    pub cache_from: Vec<String>,

    #[serde(default)]
    pub build_args: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub no_cache: bool,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default = "default_true")]
    pub inject_metadata: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
            dockerfile: None,
            tool: default_tool(),
            platforms: Vec::new(),
            cache_from: Vec::new(),
            build_args: BTreeMap::new(),
            no_cache: false,
            timeout: None,
            inject_metadata: true,
        }
    }
}

impl BuildConfig {
    /// Build options with `build_args` resolved from the environment.
    pub fn options(&self) -> Result<BuildOptions> {
        Ok(BuildOptions {
            cache_from: self.cache_from.clone(),
            platforms: self.platforms.clone(),
            build_args: resolve_env_map(&self.build_args)?,
            no_cache: self.no_cache,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Engine socket; the platform default when unset.
    #[serde(default)]
    pub socket: Option<String>,

    #[serde(default)]
    pub username: Option<EnvValue>,

    #[serde(default)]
    pub password: Option<EnvValue>,

    #[serde(default)]
    pub server: Option<String>,
}

impl RegistryConfig {
    pub fn auth(&self) -> Result<Option<RegistryAuth>> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some(RegistryAuth {
                username: username.resolve()?,
                password: password.resolve()?,
                server: self.server.clone(),
            })),
            (None, None) => Ok(None),
            _ => Err(Error::InvalidConfig(
                "registry username and password must be set together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateConfig {
    /// Checks applied before every environment.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// A command-backed gate check.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    pub name: String,

    pub command: String,

    /// Findings at or above this severity fail the gate.
    #[serde(default = "default_threshold")]
    pub threshold: Severity,

    /// Severity reported when the command exits non-zero without a JSON report.
    #[serde(default = "default_threshold")]
    pub failure_severity: Severity,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl CheckConfig {
    pub fn definition(&self) -> CheckDefinition {
        let mut check = CommandCheck::new(&self.command).failure_severity(self.failure_severity);
        if let Some(timeout) = self.timeout {
            check = check.timeout(timeout);
        }
        CheckDefinition::new(&self.name, self.threshold, Arc::new(check))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(deserialize_with = "deserialize_environment_name")]
    pub name: EnvironmentName,

    #[serde(default)]
    pub requires_approval: bool,

    /// Checks applied only before this environment, after the global ones.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,

    #[serde(default)]
    pub deploy: Option<DeployConfig>,

    #[serde(default)]
    pub health: Option<HealthConfig>,
}

impl EnvironmentConfig {
    pub fn named(name: EnvironmentName) -> Self {
        Self {
            name,
            requires_approval: false,
            checks: Vec::new(),
            deploy: None,
            health: None,
        }
    }
}

fn default_ledger() -> PathBuf {
    PathBuf::from(".hoist/ledger.json")
}

fn default_automation_actor() -> Actor {
    Actor::new("ci").expect("built-in actor is valid")
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_tool() -> String {
    "docker".to_string()
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> Severity {
    Severity::Critical
}

fn default_environments() -> NonEmpty<EnvironmentConfig> {
    let name = |s: &str| EnvironmentName::new(s).expect("built-in environment name is valid");
    let mut prod = EnvironmentConfig::named(name("prod"));
    prod.requires_approval = true;
    NonEmpty {
        head: EnvironmentConfig::named(name("dev")),
        tail: vec![EnvironmentConfig::named(name("staging")), prod],
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.anchor_paths(path);
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Make relative ledger and context paths relative to the project root
    /// (the directory holding `hoist.yml`, or the parent of `.hoist/`).
    fn anchor_paths(&mut self, config_path: &Path) {
        let Some(mut root) = config_path.parent() else {
            return;
        };
        if root.file_name().is_some_and(|n| n == ".hoist") {
            root = root.parent().unwrap_or(root);
        }
        if self.ledger.is_relative() {
            self.ledger = root.join(&self.ledger);
        }
        if self.build.context.is_relative() {
            self.build.context = root.join(&self.build.context);
        }
    }

    fn validate(&self) -> Result<()> {
        self.pipeline()?;
        for env in &self.environments {
            if let Some(ref deploy) = env.deploy {
                deploy.trigger()?;
            }
            if let Some(ref health) = env.health {
                health.probe()?;
            }
            let mut seen = HashSet::new();
            for check in self.gate.checks.iter().chain(&env.checks) {
                if !seen.insert(check.name.as_str()) {
                    return Err(Error::InvalidConfig(format!(
                        "check '{}' is defined twice for environment {}",
                        check.name, env.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let stages = self
            .environments
            .clone()
            .map(|env| (env.name, env.requires_approval));
        Pipeline::new(stages).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .iter()
            .find(|env| env.name.as_str() == name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))
    }

    pub fn repository(&self) -> Result<&ImageRepository> {
        self.image
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("`image` is not configured".to_string()))
    }

    /// Global checks followed by the environment's own checks.
    pub fn gate_for(&self, environment: &EnvironmentConfig) -> PolicyGate {
        PolicyGate::new(
            self.gate
                .checks
                .iter()
                .chain(&environment.checks)
                .map(CheckConfig::definition)
                .collect(),
        )
    }

    pub fn policy(&self) -> PromotionPolicy {
        PromotionPolicy {
            automation_actor: self.automation_actor.clone(),
            allow_skip: self.allow_skip,
        }
    }

    pub fn build_executor(&self, push: bool) -> Result<BuildExecutor> {
        let builder: Arc<dyn ImageBuilder> = Arc::new(DockerCliBuilder::new(&self.build.tool));
        let mut executor = BuildExecutor::new(builder, self.repository()?.clone())
            .inject_metadata(self.build.inject_metadata)
            .push(push)
            .timeout(self.build.timeout);
        if let Some(ref dockerfile) = self.build.dockerfile {
            executor = executor.dockerfile(dockerfile);
        }
        Ok(executor)
    }

    /// Promotion engine with every environment's gate and deploy trigger.
    pub fn promotion_engine<L: Ledger + ?Sized>(
        &self,
        ledger: Arc<L>,
    ) -> Result<PromotionEngine<L>> {
        let mut engine = PromotionEngine::new(self.pipeline()?, ledger, self.policy());
        if let Some(ref repository) = self.image {
            engine = engine.with_repository(repository.clone());
        }
        for env in &self.environments {
            engine = engine.with_gate(env.name.clone(), self.gate_for(env));
            if let Some(ref deploy) = env.deploy {
                engine = engine.with_trigger(env.name.clone(), deploy.trigger()?);
            }
        }
        Ok(engine)
    }

    pub fn rollback_controller<L: Ledger + ?Sized>(
        &self,
        engine: Arc<PromotionEngine<L>>,
    ) -> Result<RollbackController<L>> {
        let mut controller = RollbackController::new(engine)
            .health_timeout(self.rollback.health_timeout)
            .poll_interval(self.rollback.poll_interval);
        for env in &self.environments {
            if let Some(ref health) = env.health {
                controller = controller.with_probe(env.name.clone(), health.probe()?);
            }
        }
        Ok(controller)
    }

    pub fn template() -> Self {
        Config {
            image: Some(
                ImageRepository::parse("registry.example.com/my-app")
                    .expect("template repository is valid"),
            ),
            ledger: default_ledger(),
            automation_actor: default_automation_actor(),
            allow_skip: false,
            build: BuildConfig::default(),
            registry: RegistryConfig::default(),
            gate: GateConfig::default(),
            environments: default_environments(),
            rollback: RollbackConfig::default(),
        }
    }
}
