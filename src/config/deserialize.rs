// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Validates repositories, environment names, actors, and the environment list.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::EnvironmentConfig;
use crate::types::{Actor, EnvironmentName, ImageRepository};

pub fn deserialize_repository_option<'de, D>(
    deserializer: D,
) -> Result<Option<ImageRepository>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    opt.map(|s| ImageRepository::parse(&s).map_err(serde::de::Error::custom))
        .transpose()
}

pub fn deserialize_environment_name<'de, D>(deserializer: D) -> Result<EnvironmentName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    EnvironmentName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_actor<'de, D>(deserializer: D) -> Result<Actor, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Actor::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_environments<'de, D>(
    deserializer: D,
) -> Result<NonEmpty<EnvironmentConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<EnvironmentEntry> = Vec::deserialize(deserializer)?;
    let environments = values
        .into_iter()
        .map(EnvironmentEntry::into_environment_config)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(environments)
        .ok_or_else(|| serde::de::Error::custom("at least one environment is required"))
}

/// An environment is either just its name or a full definition.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvironmentEntry {
    Simple(String),
    Detailed(EnvironmentConfig),
}

impl EnvironmentEntry {
    fn into_environment_config(self) -> Result<EnvironmentConfig, String> {
        match self {
            EnvironmentEntry::Simple(s) => EnvironmentName::new(&s)
                .map(EnvironmentConfig::named)
                .map_err(|e| e.to_string()),
            EnvironmentEntry::Detailed(c) => Ok(c),
        }
    }
}
