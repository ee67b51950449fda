// ABOUTME: Ordered deployment environments (dev -> staging -> prod or custom stages).
// ABOUTME: The pipeline owns the total order promotions must follow.

use nonempty::NonEmpty;
use std::collections::HashSet;
use thiserror::Error;

use crate::types::EnvironmentName;

/// One deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    name: EnvironmentName,
    order: u32,
    requires_approval: bool,
}

impl Environment {
    pub fn name(&self) -> &EnvironmentName {
        &self.name
    }

    /// Zero-based rank; promotions move from `order` to `order + 1`.
    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("duplicate environment name: {0}")]
    DuplicateEnvironment(EnvironmentName),
}

/// Environments in promotion order. Never empty.
#[derive(Debug, Clone)]
pub struct Pipeline {
    environments: NonEmpty<Environment>,
}

impl Pipeline {
    /// Build a pipeline from `(name, requires_approval)` pairs in promotion order.
    pub fn new(stages: NonEmpty<(EnvironmentName, bool)>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for (name, _) in stages.iter() {
            if !seen.insert(name.clone()) {
                return Err(PipelineError::DuplicateEnvironment(name.clone()));
            }
        }

        let mut order = 0u32;
        let environments = stages.map(|(name, requires_approval)| {
            let env = Environment {
                name,
                order,
                requires_approval,
            };
            order += 1;
            env
        });

        Ok(Self { environments })
    }

    /// The conventional dev -> staging -> prod pipeline, approval on prod.
    pub fn standard() -> Self {
        let stage = |name: &str, approval| {
            (
                EnvironmentName::new(name).expect("built-in environment names are valid"),
                approval,
            )
        };
        Self::new(NonEmpty::from((
            stage("dev", false),
            vec![stage("staging", false), stage("prod", true)],
        )))
        .expect("built-in environment names are unique")
    }

    pub fn get(&self, name: &EnvironmentName) -> Option<&Environment> {
        self.environments.iter().find(|env| &env.name == name)
    }

    pub fn by_order(&self, order: u32) -> Option<&Environment> {
        self.environments.get(order as usize)
    }

    /// The entry stage every artifact must reach first.
    pub fn first(&self) -> &Environment {
        self.environments.first()
    }

    pub fn next_after(&self, env: &Environment) -> Option<&Environment> {
        self.by_order(env.order + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.environments.iter()
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> EnvironmentName {
        EnvironmentName::new(s).unwrap()
    }

    #[test]
    fn standard_pipeline_is_ordered() {
        let pipeline = Pipeline::standard();
        let names: Vec<_> = pipeline.iter().map(|e| e.name().as_str()).collect();
        assert_eq!(names, vec!["dev", "staging", "prod"]);
        assert_eq!(pipeline.first().name().as_str(), "dev");
        assert!(pipeline.get(&name("prod")).unwrap().requires_approval());
        assert!(!pipeline.get(&name("dev")).unwrap().requires_approval());
    }

    #[test]
    fn next_after_follows_order() {
        let pipeline = Pipeline::standard();
        let dev = pipeline.get(&name("dev")).unwrap();
        let staging = pipeline.next_after(dev).unwrap();
        assert_eq!(staging.name().as_str(), "staging");
        assert_eq!(staging.order(), 1);
        let prod = pipeline.next_after(staging).unwrap();
        assert!(pipeline.next_after(prod).is_none());
    }

    #[test]
    fn custom_stages_keep_given_order() {
        let pipeline = Pipeline::new(NonEmpty::from((
            (name("qa"), false),
            vec![(name("canary"), true), (name("live"), true)],
        )))
        .unwrap();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.by_order(1).unwrap().name().as_str(), "canary");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Pipeline::new(NonEmpty::from((
            (name("dev"), false),
            vec![(name("dev"), true)],
        )))
        .unwrap_err();
        assert_eq!(err, PipelineError::DuplicateEnvironment(name("dev")));
    }
}
