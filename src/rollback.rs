// ABOUTME: Rollback controller: restores an earlier ledger record's artifact in an environment.
// ABOUTME: Appends a new rollback record, then waits for the environment to report healthy.

use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::artifact::Artifact;
use crate::collab::HealthProbe;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::ErrorKind;
use crate::ledger::{History, Ledger, LedgerError, PromotionRecord, RecordDraft, RecordKind};
use crate::promote::PromotionEngine;
use crate::types::{Actor, EnvironmentName, RecordSeq};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RollbackError {
    #[snafu(display(
        "cannot roll back{}: environment '{environment}' is not in the pipeline",
        describe(" to ", artifact)
    ))]
    UnknownEnvironment {
        /// Artifact of the requested record, when the ledger has it.
        artifact: Option<Box<Artifact>>,
        environment: EnvironmentName,
    },

    #[snafu(display(
        "record {record}{} is not in the history of {environment}{}",
        in_parens(requested),
        describe("; current is ", current)
    ))]
    RecordNotInHistory {
        environment: EnvironmentName,
        record: RecordSeq,
        /// Artifact of `record`, when the ledger has it at all.
        requested: Option<Box<Artifact>>,
        /// What `environment` runs now.
        current: Option<Box<Artifact>>,
    },

    #[snafu(display(
        "{environment} has no earlier artifact to roll back to{}",
        describe(" from ", current)
    ))]
    NoPreviousArtifact {
        environment: EnvironmentName,
        current: Option<Box<Artifact>>,
    },

    #[snafu(display(
        "rollback of {environment} to {artifact} requires approval by a named person, not '{actor}'"
    ))]
    ApprovalRequired {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        actor: Actor,
    },

    #[snafu(display(
        "rollback of {environment}{} not recorded: {source}",
        describe(" to ", artifact)
    ))]
    Ledger {
        /// The artifact being restored, once it is known.
        artifact: Option<Box<Artifact>>,
        environment: EnvironmentName,
        source: LedgerError,
    },
}

fn in_parens(artifact: &Option<Box<Artifact>>) -> String {
    artifact
        .as_ref()
        .map(|a| format!(" ({a})"))
        .unwrap_or_default()
}

fn describe(prefix: &str, artifact: &Option<Box<Artifact>>) -> String {
    artifact
        .as_ref()
        .map(|a| format!("{prefix}{a}"))
        .unwrap_or_default()
}

impl RollbackError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RollbackError::RecordNotInHistory { .. } => Some(ErrorKind::RecordNotInHistory),
            RollbackError::ApprovalRequired { .. } => Some(ErrorKind::ApprovalRequired),
            RollbackError::Ledger { source, .. } => source.kind(),
            RollbackError::UnknownEnvironment { .. } | RollbackError::NoPreviousArtifact { .. } => {
                None
            }
        }
    }

    /// The artifact the failed rollback was about: the one being restored
    /// when known, otherwise what the environment currently runs.
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            RollbackError::ApprovalRequired { artifact, .. } => Some(artifact),
            RollbackError::UnknownEnvironment { artifact, .. }
            | RollbackError::Ledger { artifact, .. } => artifact.as_deref(),
            RollbackError::RecordNotInHistory {
                requested, current, ..
            } => requested.as_deref().or(current.as_deref()),
            RollbackError::NoPreviousArtifact { current, .. } => current.as_deref(),
        }
    }

    pub fn environment(&self) -> &EnvironmentName {
        match self {
            RollbackError::UnknownEnvironment { environment, .. }
            | RollbackError::RecordNotInHistory { environment, .. }
            | RollbackError::NoPreviousArtifact { environment, .. }
            | RollbackError::ApprovalRequired { environment, .. }
            | RollbackError::Ledger { environment, .. } => environment,
        }
    }
}

/// Health outcome of a committed rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    Confirmed { detail: String },
    /// The record stands; someone needs to look at the environment.
    HealthUnconfirmed { reason: String },
}

impl RollbackOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, RollbackOutcome::Confirmed { .. })
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RollbackOutcome::Confirmed { .. } => None,
            RollbackOutcome::HealthUnconfirmed { .. } => Some(ErrorKind::RollbackHealthUnconfirmed),
        }
    }
}

/// A committed rollback.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub record: PromotionRecord,
    pub outcome: RollbackOutcome,
}

pub struct RollbackController<L: ?Sized> {
    engine: Arc<PromotionEngine<L>>,
    probes: HashMap<EnvironmentName, Arc<dyn HealthProbe>>,
    health_timeout: Duration,
    poll_interval: Duration,
}

impl<L: Ledger + ?Sized> RollbackController<L> {
    pub fn new(engine: Arc<PromotionEngine<L>>) -> Self {
        Self {
            engine,
            probes: HashMap::new(),
            health_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_probe(mut self, environment: EnvironmentName, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.insert(environment, probe);
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn ledger(&self) -> &L {
        self.engine.ledger().as_ref()
    }

    /// Artifact of record `seq`, for error context only.
    fn artifact_of(&self, seq: RecordSeq) -> Option<Box<Artifact>> {
        self.ledger().record(seq).ok().map(|r| Box::new(r.artifact))
    }

    /// Newest record in the history of `environment` whose artifact differs
    /// from the current one.
    pub fn previous_distinct(
        &self,
        environment: &EnvironmentName,
    ) -> Result<PromotionRecord, RollbackError> {
        let ledger_failed = |artifact: Option<&Artifact>| LedgerSnafu {
            artifact: artifact.cloned().map(Box::new),
            environment: environment.clone(),
        };
        let mut history = History::new(self.ledger(), environment).context(ledger_failed(None))?;

        let current = match history.next() {
            Some(record) => record.context(ledger_failed(None))?,
            None => {
                return NoPreviousArtifactSnafu {
                    environment: environment.clone(),
                    current: None::<Box<Artifact>>,
                }
                .fail();
            }
        };

        for record in history {
            let record = record.context(ledger_failed(Some(&current.artifact)))?;
            if !record.artifact.same_image(&current.artifact) {
                return Ok(record);
            }
        }
        NoPreviousArtifactSnafu {
            environment: environment.clone(),
            current: Some(Box::new(current.artifact)),
        }
        .fail()
    }

    /// Make `target`'s artifact current again in `environment`.
    ///
    /// The rollback record is committed before health is checked and is never
    /// undone. If health is not confirmed within the timeout the report says
    /// so and a warning is added to `diagnostics`.
    pub async fn rollback_to(
        &self,
        environment: &EnvironmentName,
        target: RecordSeq,
        actor: Actor,
        diagnostics: &mut Diagnostics,
    ) -> Result<RollbackReport, RollbackError> {
        let ledger_failed = |artifact: Option<&Artifact>| LedgerSnafu {
            artifact: artifact.cloned().map(Box::new),
            environment: environment.clone(),
        };

        let Some(env) = self.engine.pipeline().get(environment) else {
            return UnknownEnvironmentSnafu {
                artifact: self.artifact_of(target),
                environment: environment.clone(),
            }
            .fail();
        };

        let mut history = History::new(self.ledger(), environment).context(ledger_failed(None))?;
        let head = history.head();
        let restored = history
            .find_map(|r| match r {
                Ok(record) if record.seq == target => Some(Ok(record)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .transpose()
            .context(ledger_failed(None))?;
        let Some(restored) = restored else {
            return RecordNotInHistorySnafu {
                environment: environment.clone(),
                record: target,
                requested: self.artifact_of(target),
                current: self
                    .ledger()
                    .current_for(environment)
                    .ok()
                    .map(|r| Box::new(r.artifact)),
            }
            .fail();
        };

        if env.requires_approval() && actor == self.engine.policy().automation_actor {
            return ApprovalRequiredSnafu {
                artifact: Box::new(restored.artifact),
                environment: environment.clone(),
                actor,
            }
            .fail();
        }

        let draft = RecordDraft {
            environment: environment.clone(),
            artifact: restored.artifact.clone(),
            promoted_by: actor,
            kind: RecordKind::Rollback {
                restored: restored.seq,
            },
        };
        let record = self
            .ledger()
            .append(head, draft)
            .context(ledger_failed(Some(&restored.artifact)))?;
        tracing::info!(
            seq = %record.seq,
            restored = %restored.seq,
            "rolled back {} to {}",
            environment,
            record.artifact
        );

        self.engine.announce(&record, diagnostics).await;

        let outcome = self.confirm_health(&record.artifact, environment).await;
        if let RollbackOutcome::HealthUnconfirmed { reason } = &outcome {
            diagnostics.warn(Warning::rollback_health_unconfirmed(format!(
                "rollback of {} to {} is committed as {} but health is unconfirmed: {}",
                environment, record.artifact, record.seq, reason
            )));
        }

        Ok(RollbackReport { record, outcome })
    }

    /// Poll the environment's probe until it reports healthy or time runs out.
    async fn confirm_health(
        &self,
        artifact: &Artifact,
        environment: &EnvironmentName,
    ) -> RollbackOutcome {
        let Some(probe) = self.probes.get(environment) else {
            return RollbackOutcome::HealthUnconfirmed {
                reason: "no health probe configured".to_string(),
            };
        };

        let deadline = Instant::now() + self.health_timeout;
        let mut last = String::from("no probe completed");
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, probe.probe(artifact, environment)).await {
                Ok(Ok(report)) if report.healthy => {
                    return RollbackOutcome::Confirmed {
                        detail: report.detail,
                    };
                }
                Ok(Ok(report)) => last = report.to_string(),
                Ok(Err(e)) => last = e.to_string(),
                Err(_) => last = "probe did not answer in time".to_string(),
            }

            if Instant::now() + self.poll_interval >= deadline {
                return RollbackOutcome::HealthUnconfirmed {
                    reason: format!("not healthy within {:?} ({})", self.health_timeout, last),
                };
            }
            tracing::debug!("{} not healthy yet: {}", environment, last);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl<L: ?Sized> std::fmt::Debug for RollbackController<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackController")
            .field("probes", &self.probes.len())
            .field("health_timeout", &self.health_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
