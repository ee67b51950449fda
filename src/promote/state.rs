// ABOUTME: Promotion hop state markers for the type state pattern.
// ABOUTME: Each marker carries the data that exists once the hop reaches that state.

use std::fmt;

use crate::gate::GateResult;
use crate::ledger::PromotionRecord;

/// Ordering, approval, and the expected ledger head are settled.
/// Available actions: `evaluate()`, `with_result()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// The gate passed for this artifact and environment.
/// Available actions: `commit()`
#[derive(Debug, Clone)]
pub struct GatePassed {
    pub(crate) result: GateResult,
}

/// The gate rejected the artifact.
/// Available actions: `into_result()`
#[derive(Debug, Clone)]
pub struct GateFailed {
    pub(crate) result: GateResult,
}

/// The ledger append committed. Terminal for this hop.
#[derive(Debug, Clone)]
pub struct Promoted {
    pub(crate) record: PromotionRecord,
}

/// Runtime view of where a hop is, for logs and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionState {
    Pending,
    GateChecking,
    GatePassed,
    GateFailed,
    Promoted,
    PromotionFailed,
}

impl fmt::Display for PromotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PromotionState::Pending => "pending",
            PromotionState::GateChecking => "gate_checking",
            PromotionState::GatePassed => "gate_passed",
            PromotionState::GateFailed => "gate_failed",
            PromotionState::Promoted => "promoted",
            PromotionState::PromotionFailed => "promotion_failed",
        };
        f.write_str(s)
    }
}

pub trait HopState {
    const STATE: PromotionState;
}

impl HopState for Pending {
    const STATE: PromotionState = PromotionState::Pending;
}

impl HopState for GatePassed {
    const STATE: PromotionState = PromotionState::GatePassed;
}

impl HopState for GateFailed {
    const STATE: PromotionState = PromotionState::GateFailed;
}

impl HopState for Promoted {
    const STATE: PromotionState = PromotionState::Promoted;
}
