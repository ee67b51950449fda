// ABOUTME: One promotion hop of an artifact into one environment, parameterized by state.
// ABOUTME: Transitions consume the hop, so only a gate-passed hop can reach the ledger.

use crate::artifact::Artifact;
use crate::gate::{GateError, GateResult, PolicyGate};
use crate::ledger::{Ledger, LedgerError, PromotionRecord, RecordDraft, RecordKind};
use crate::types::{Actor, EnvironmentName, RecordSeq};

use super::state::{GateFailed, GatePassed, HopState, Pending, PromotionState, Promoted};

/// An artifact moving into one environment.
#[derive(Debug, Clone)]
pub struct Hop<S> {
    artifact: Artifact,
    environment: EnvironmentName,
    actor: Actor,
    /// Ledger head of the target environment when the decision was made.
    expected_current: Option<RecordSeq>,
    state: S,
}

/// Where a hop lands after its gate.
#[derive(Debug)]
pub enum GateVerdict {
    Passed(Hop<GatePassed>),
    Failed(Hop<GateFailed>),
}

impl<S> Hop<S> {
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn expected_current(&self) -> Option<RecordSeq> {
        self.expected_current
    }

    fn transition<T>(self, state: T) -> Hop<T> {
        Hop {
            artifact: self.artifact,
            environment: self.environment,
            actor: self.actor,
            expected_current: self.expected_current,
            state,
        }
    }
}

impl<S: HopState> Hop<S> {
    pub fn state(&self) -> PromotionState {
        S::STATE
    }
}

impl Hop<Pending> {
    pub fn new(
        artifact: Artifact,
        environment: EnvironmentName,
        actor: Actor,
        expected_current: Option<RecordSeq>,
    ) -> Self {
        Hop {
            artifact,
            environment,
            actor,
            expected_current,
            state: Pending,
        }
    }

    /// Run `gate` against the artifact.
    pub async fn evaluate(
        self,
        gate: &PolicyGate,
        image: Option<&str>,
    ) -> Result<GateVerdict, GateError> {
        tracing::debug!(
            environment = %self.environment,
            state = %PromotionState::GateChecking,
            checks = gate.len(),
            "evaluating gate for {}",
            self.artifact
        );
        let result = gate.evaluate(&self.artifact, &self.environment, image).await?;
        Ok(self.with_result(result))
    }

    /// Decide using an earlier gate result for the same artifact and environment.
    pub fn with_result(self, result: GateResult) -> GateVerdict {
        let verdict = if result.passed() {
            GateVerdict::Passed(self.transition(GatePassed { result }))
        } else {
            GateVerdict::Failed(self.transition(GateFailed { result }))
        };
        tracing::debug!(state = %verdict.state(), "gate decided");
        verdict
    }
}

impl GateVerdict {
    pub fn state(&self) -> PromotionState {
        match self {
            GateVerdict::Passed(hop) => hop.state(),
            GateVerdict::Failed(hop) => hop.state(),
        }
    }
}

impl Hop<GatePassed> {
    pub fn gate_result(&self) -> &GateResult {
        &self.state.result
    }

    /// Append the promotion record. Fails with `ConcurrentModification` if the
    /// environment's head moved since the hop was created.
    pub fn commit<L: Ledger + ?Sized>(self, ledger: &L) -> Result<Hop<Promoted>, LedgerError> {
        let draft = RecordDraft {
            environment: self.environment.clone(),
            artifact: self.artifact.clone(),
            promoted_by: self.actor.clone(),
            kind: RecordKind::Promotion,
        };
        match ledger.append(self.expected_current, draft) {
            Ok(record) => Ok(self.transition(Promoted { record })),
            Err(e) => {
                tracing::debug!(state = %PromotionState::PromotionFailed, "ledger append failed: {}", e);
                Err(e)
            }
        }
    }
}

impl Hop<GateFailed> {
    pub fn gate_result(&self) -> &GateResult {
        &self.state.result
    }

    pub fn into_result(self) -> GateResult {
        self.state.result
    }
}

impl Hop<Promoted> {
    pub fn record(&self) -> &PromotionRecord {
        &self.state.record
    }

    pub fn into_record(self) -> PromotionRecord {
        self.state.record
    }
}
