// ABOUTME: Process-local ledger backend.
// ABOUTME: Used by tests and dry runs; the mutex makes each append an atomic CAS.

use parking_lot::Mutex;

use super::state::LedgerState;
use super::{Ledger, LedgerError, PromotionRecord, RecordDraft};
use crate::gate::GateResult;
use crate::types::{Digest, EnvironmentName, RecordSeq};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn current_for(&self, environment: &EnvironmentName) -> Result<PromotionRecord, LedgerError> {
        self.state.lock().current_for(environment)
    }

    fn record(&self, seq: RecordSeq) -> Result<PromotionRecord, LedgerError> {
        self.state.lock().record(seq)
    }

    fn append(
        &self,
        expected_current: Option<RecordSeq>,
        draft: RecordDraft,
    ) -> Result<PromotionRecord, LedgerError> {
        self.state.lock().append(expected_current, draft)
    }

    fn records_for_artifact(&self, digest: &Digest) -> Result<Vec<PromotionRecord>, LedgerError> {
        Ok(self.state.lock().records_for_artifact(digest))
    }

    fn environments(&self) -> Result<Vec<EnvironmentName>, LedgerError> {
        Ok(self.state.lock().environments())
    }

    fn latest_gate_result(
        &self,
        digest: &Digest,
        environment: &EnvironmentName,
    ) -> Result<Option<GateResult>, LedgerError> {
        Ok(self.state.lock().latest_gate_result(digest, environment))
    }

    fn record_gate_result(&self, result: GateResult) -> Result<(), LedgerError> {
        self.state.lock().record_gate_result(result);
        Ok(())
    }
}
