// ABOUTME: Config values that are either literals or references to environment variables.
// ABOUTME: Used for build args and registry credentials; resolved only when the value is needed.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env::VarError;

/// `value` or `{ env: VAR, default: value }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(value) => Ok(value.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(value) => Ok(value),
                Err(VarError::NotPresent) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
                Err(VarError::NotUnicode(_)) => Err(Error::InvalidConfig(format!(
                    "environment variable {var} is not valid UTF-8"
                ))),
            },
        }
    }

    /// Where the value comes from. Safe to log; never includes a variable's value.
    pub fn source(&self) -> String {
        match self {
            EnvValue::Literal(_) => "inline".to_string(),
            EnvValue::FromEnv { var, .. } => format!("${var}"),
        }
    }
}

pub fn resolve_env_map(map: &BTreeMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    let mut resolved = BTreeMap::new();
    for (key, value) in map {
        tracing::debug!(key = %key, source = %value.source(), "resolving config value");
        resolved.insert(key.clone(), value.resolve()?);
    }
    Ok(resolved)
}
