// ABOUTME: Promotion engine: moves artifacts through the ordered pipeline one hop at a time.
// ABOUTME: Enforces adjacency and approval, consults the gate, and commits to the ledger.

mod hop;
mod state;

pub use hop::{GateVerdict, Hop};
pub use state::{GateFailed, GatePassed, HopState, Pending, PromotionState, Promoted};

use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::artifact::Artifact;
use crate::collab::DeployTrigger;
use crate::diagnostics::{Diagnostics, Warning};
use crate::environment::{Environment, Pipeline};
use crate::error::ErrorKind;
use crate::event::PromotionEvent;
use crate::gate::{GateError, GateResult, PolicyGate};
use crate::ledger::{Ledger, LedgerError, PromotionRecord};
use crate::types::{Actor, EnvironmentName, ImageRepository};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PromoteError {
    #[snafu(display("cannot promote {artifact}: environment '{environment}' is not in the pipeline"))]
    UnknownEnvironment {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
    },

    #[snafu(display(
        "out-of-order promotion of {artifact} to {environment}: {}",
        describe_expected(expected)
    ))]
    OutOfOrder {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        expected: Option<EnvironmentName>,
    },

    #[snafu(display(
        "promotion of {artifact} to {environment} requires approval by a named person, not '{actor}'"
    ))]
    ApprovalRequired {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        actor: Actor,
    },

    #[snafu(display("policy gate rejected {artifact} for {environment}: {result}"))]
    GateRejected {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        result: Box<GateResult>,
    },

    #[snafu(display("{source}"))]
    GateExecution {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        source: GateError,
    },

    #[snafu(display("promotion of {artifact} to {environment} not recorded: {source}"))]
    Ledger {
        artifact: Box<Artifact>,
        environment: EnvironmentName,
        source: LedgerError,
    },
}

fn describe_expected(expected: &Option<EnvironmentName>) -> String {
    match expected {
        Some(next) => format!("next environment must be {next}"),
        None => "artifact is already in the last environment".to_string(),
    }
}

impl PromoteError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PromoteError::UnknownEnvironment { .. } => None,
            PromoteError::OutOfOrder { .. } => Some(ErrorKind::OutOfOrderPromotion),
            PromoteError::ApprovalRequired { .. } => Some(ErrorKind::ApprovalRequired),
            PromoteError::GateRejected { .. } => Some(ErrorKind::PolicyGateRejected),
            PromoteError::GateExecution { source, .. } => Some(source.kind()),
            PromoteError::Ledger { source, .. } => source.kind(),
        }
    }

    pub fn artifact(&self) -> &Artifact {
        match self {
            PromoteError::UnknownEnvironment { artifact, .. }
            | PromoteError::OutOfOrder { artifact, .. }
            | PromoteError::ApprovalRequired { artifact, .. }
            | PromoteError::GateRejected { artifact, .. }
            | PromoteError::GateExecution { artifact, .. }
            | PromoteError::Ledger { artifact, .. } => artifact,
        }
    }

    pub fn environment(&self) -> &EnvironmentName {
        match self {
            PromoteError::UnknownEnvironment { environment, .. }
            | PromoteError::OutOfOrder { environment, .. }
            | PromoteError::ApprovalRequired { environment, .. }
            | PromoteError::GateRejected { environment, .. }
            | PromoteError::GateExecution { environment, .. }
            | PromoteError::Ledger { environment, .. } => environment,
        }
    }
}

/// Rules that are configuration, not code.
#[derive(Debug, Clone)]
pub struct PromotionPolicy {
    /// The identity automated pipelines promote as. Never counts as approval.
    pub automation_actor: Actor,
    /// Whether a request may skip intermediate environments.
    pub allow_skip: bool,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            automation_actor: Actor::new("ci").expect("built-in actor is valid"),
            allow_skip: false,
        }
    }
}

/// One `Promote(artifact, target, actor)` call.
#[derive(Debug, Clone)]
pub struct PromoteRequest {
    pub artifact: Artifact,
    pub target: EnvironmentName,
    pub actor: Actor,
    /// Ask to skip intermediate environments. Honoured only when the policy allows it.
    pub skip_ordering: bool,
    /// Ignore any stored gate result and run the checks again.
    pub reevaluate_gate: bool,
}

impl PromoteRequest {
    pub fn new(artifact: Artifact, target: EnvironmentName, actor: Actor) -> Self {
        Self {
            artifact,
            target,
            actor,
            skip_ordering: false,
            reevaluate_gate: false,
        }
    }

    pub fn skip_ordering(mut self, skip: bool) -> Self {
        self.skip_ordering = skip;
        self
    }

    pub fn reevaluate_gate(mut self, reevaluate: bool) -> Self {
        self.reevaluate_gate = reevaluate;
        self
    }
}

/// Orchestrates promotions against one ledger.
pub struct PromotionEngine<L: ?Sized> {
    pipeline: Pipeline,
    ledger: Arc<L>,
    policy: PromotionPolicy,
    gates: HashMap<EnvironmentName, PolicyGate>,
    triggers: HashMap<EnvironmentName, Arc<dyn DeployTrigger>>,
    repository: Option<ImageRepository>,
    events: broadcast::Sender<PromotionEvent>,
}

impl<L: Ledger + ?Sized> PromotionEngine<L> {
    pub fn new(pipeline: Pipeline, ledger: Arc<L>, policy: PromotionPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pipeline,
            ledger,
            policy,
            gates: HashMap::new(),
            triggers: HashMap::new(),
            repository: None,
            events,
        }
    }

    /// Checks that guard promotion into `environment`.
    pub fn with_gate(mut self, environment: EnvironmentName, gate: PolicyGate) -> Self {
        self.gates.insert(environment, gate);
        self
    }

    /// Collaborator told to deploy whatever is promoted into `environment`.
    pub fn with_trigger(
        mut self,
        environment: EnvironmentName,
        trigger: Arc<dyn DeployTrigger>,
    ) -> Self {
        self.triggers.insert(environment, trigger);
        self
    }

    /// Repository used to give checks a pinned image reference.
    pub fn with_repository(mut self, repository: ImageRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    pub fn gate_for(&self, environment: &EnvironmentName) -> Option<&PolicyGate> {
        self.gates.get(environment)
    }

    pub fn trigger_for(&self, environment: &EnvironmentName) -> Option<&Arc<dyn DeployTrigger>> {
        self.triggers.get(environment)
    }

    /// Receive every committed promotion and rollback from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PromotionEvent> {
        self.events.subscribe()
    }

    /// The highest-ordered environment whose current record is `artifact`.
    ///
    /// Superseded records do not count: an artifact rolled out of an
    /// environment is no longer there. `None` means it is current nowhere and
    /// re-enters at the first environment.
    pub fn current_environment(&self, artifact: &Artifact) -> Result<Option<&Environment>, LedgerError> {
        let mut current = None;
        for environment in self.pipeline.iter() {
            match self.ledger.current_for(environment.name()) {
                Ok(record) if record.artifact.same_image(artifact) => current = Some(environment),
                Ok(_) | Err(LedgerError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(current)
    }

    /// Run the gate for `artifact` entering `environment` and store the result.
    pub async fn evaluate_gate(
        &self,
        artifact: &Artifact,
        environment: &EnvironmentName,
    ) -> Result<GateResult, PromoteError> {
        if self.pipeline.get(environment).is_none() {
            return UnknownEnvironmentSnafu {
                artifact: Box::new(artifact.clone()),
                environment: environment.clone(),
            }
            .fail();
        }

        let image = self.pinned_image(artifact);
        let result = self
            .gates
            .get(environment)
            .cloned()
            .unwrap_or_default()
            .evaluate(artifact, environment, image.as_deref())
            .await
            .context(GateExecutionSnafu {
                artifact: Box::new(artifact.clone()),
                environment: environment.clone(),
            })?;
        self.ledger
            .record_gate_result(result.clone())
            .context(LedgerSnafu {
                artifact: Box::new(artifact.clone()),
                environment: environment.clone(),
            })?;
        Ok(result)
    }

    /// Promote an artifact one step along the pipeline.
    ///
    /// Nothing is written unless every precondition holds and the gate passes.
    /// After the append commits, the event is broadcast and the environment's
    /// deploy trigger runs. A trigger failure goes to `diagnostics`; the
    /// promotion stays committed.
    pub async fn promote(
        &self,
        request: PromoteRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<PromotionRecord, PromoteError> {
        let PromoteRequest {
            artifact,
            target,
            actor,
            skip_ordering,
            reevaluate_gate,
        } = request;
        let boxed = Box::new(artifact.clone());

        let Some(environment) = self.pipeline.get(&target) else {
            return UnknownEnvironmentSnafu {
                artifact: boxed,
                environment: target,
            }
            .fail();
        };

        let current = self
            .current_environment(&artifact)
            .context(LedgerSnafu {
                artifact: boxed.clone(),
                environment: target.clone(),
            })?;
        self.check_order(&artifact, environment, current, skip_ordering)?;

        if environment.requires_approval() && actor == self.policy.automation_actor {
            return ApprovalRequiredSnafu {
                artifact: boxed,
                environment: target,
                actor,
            }
            .fail();
        }

        let expected_current = match self.ledger.current_for(&target) {
            Ok(record) => Some(record.seq),
            Err(LedgerError::NotFound { .. }) => None,
            Err(source) => {
                return Err(source).context(LedgerSnafu {
                    artifact: boxed,
                    environment: target,
                });
            }
        };

        let hop = Hop::new(artifact, target.clone(), actor, expected_current);
        let verdict = match self.cached_gate_result(&hop, reevaluate_gate) {
            Some(result) => {
                tracing::debug!("reusing gate result from {}", result.evaluated_at());
                hop.with_result(result)
            }
            None => {
                let image = self.pinned_image(hop.artifact());
                let gate = self.gates.get(&target).cloned().unwrap_or_default();
                let verdict = hop
                    .evaluate(&gate, image.as_deref())
                    .await
                    .context(GateExecutionSnafu {
                        artifact: boxed.clone(),
                        environment: target.clone(),
                    })?;
                let result = match &verdict {
                    GateVerdict::Passed(h) => h.gate_result().clone(),
                    GateVerdict::Failed(h) => h.gate_result().clone(),
                };
                self.ledger
                    .record_gate_result(result)
                    .context(LedgerSnafu {
                        artifact: boxed.clone(),
                        environment: target.clone(),
                    })?;
                verdict
            }
        };

        let passed = match verdict {
            GateVerdict::Passed(hop) => hop,
            GateVerdict::Failed(hop) => {
                return GateRejectedSnafu {
                    artifact: boxed,
                    environment: target,
                    result: Box::new(hop.into_result()),
                }
                .fail();
            }
        };

        let record = passed
            .commit(self.ledger.as_ref())
            .context(LedgerSnafu {
                artifact: boxed,
                environment: target,
            })?
            .into_record();
        tracing::info!(
            seq = %record.seq,
            environment = %record.environment,
            actor = %record.promoted_by,
            "promoted {}",
            record.artifact
        );

        self.announce(&record, diagnostics).await;
        Ok(record)
    }

    /// Broadcast a committed record and hand it to the environment's trigger.
    pub(crate) async fn announce(&self, record: &PromotionRecord, diagnostics: &mut Diagnostics) {
        let event = PromotionEvent::from_record(record);
        // No subscribers is fine.
        let _ = self.events.send(event.clone());

        if let Some(trigger) = self.triggers.get(&record.environment)
            && let Err(e) = trigger.trigger(&event).await
        {
            diagnostics.warn(Warning::deploy_trigger_failed(format!(
                "{} committed to {} as {}, but the deploy trigger failed: {}",
                record.artifact, record.environment, record.seq, e
            )));
        }
    }

    fn check_order(
        &self,
        artifact: &Artifact,
        target: &Environment,
        current: Option<&Environment>,
        skip_requested: bool,
    ) -> Result<(), PromoteError> {
        let skip = skip_requested && self.policy.allow_skip;
        if skip_requested && !skip {
            tracing::warn!("skipping environments is disabled by configuration; ignoring request");
        }

        let (in_order, expected) = match current {
            None => (
                skip || target.order() == self.pipeline.first().order(),
                Some(self.pipeline.first()),
            ),
            Some(current) => {
                let next = self.pipeline.next_after(current);
                let in_order = if skip {
                    target.order() > current.order()
                } else {
                    next.is_some_and(|n| n.order() == target.order())
                };
                (in_order, next)
            }
        };

        if in_order {
            if skip && expected.is_some_and(|e| e.order() != target.order()) {
                tracing::warn!(
                    "promoting {} to {} skips intermediate environments",
                    artifact,
                    target.name()
                );
            }
            return Ok(());
        }

        OutOfOrderSnafu {
            artifact: Box::new(artifact.clone()),
            environment: target.name().clone(),
            expected: expected.map(|e| e.name().clone()),
        }
        .fail()
    }

    fn cached_gate_result(&self, hop: &Hop<Pending>, reevaluate: bool) -> Option<GateResult> {
        if reevaluate {
            return None;
        }
        match self
            .ledger
            .latest_gate_result(hop.artifact().digest(), hop.environment())
        {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("could not read stored gate results, re-evaluating: {}", e);
                None
            }
        }
    }

    fn pinned_image(&self, artifact: &Artifact) -> Option<String> {
        self.repository
            .as_ref()
            .map(|repo| repo.pinned(artifact.digest()))
    }
}

impl<L: ?Sized> std::fmt::Debug for PromotionEngine<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionEngine")
            .field("pipeline", &self.pipeline)
            .field("policy", &self.policy)
            .field("gates", &self.gates.len())
            .field("triggers", &self.triggers.len())
            .finish()
    }
}
