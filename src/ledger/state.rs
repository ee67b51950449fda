// ABOUTME: In-memory ledger contents shared by the memory and file backends.
// ABOUTME: Records live in an arena indexed by sequence number; one current pointer per environment.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{LedgerError, PromotionRecord, RecordDraft, RecordKind};
use crate::gate::GateResult;
use crate::types::{Digest, EnvironmentName, RecordSeq};

pub(crate) const FORMAT_VERSION: u32 = 1;

/// Serialized form of a whole ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    format: u32,
    #[serde(default)]
    records: Vec<PromotionRecord>,
    #[serde(default)]
    current: BTreeMap<EnvironmentName, RecordSeq>,
    #[serde(default)]
    gate_results: Vec<GateResult>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            format: FORMAT_VERSION,
            records: Vec::new(),
            current: BTreeMap::new(),
            gate_results: Vec::new(),
        }
    }
}

impl LedgerState {
    pub(crate) fn current_seq(&self, environment: &EnvironmentName) -> Option<RecordSeq> {
        self.current.get(environment).copied()
    }

    pub(crate) fn current_for(
        &self,
        environment: &EnvironmentName,
    ) -> Result<PromotionRecord, LedgerError> {
        let seq = self
            .current_seq(environment)
            .ok_or_else(|| LedgerError::NotFound {
                environment: environment.clone(),
            })?;
        self.record(seq)
    }

    pub(crate) fn record(&self, seq: RecordSeq) -> Result<PromotionRecord, LedgerError> {
        self.records
            .get(seq.index())
            .filter(|r| r.seq == seq)
            .cloned()
            .ok_or(LedgerError::UnknownRecord(seq))
    }

    /// Compare-and-swap append. Nothing changes unless the environment's
    /// current record is still `expected`.
    pub(crate) fn append(
        &mut self,
        expected: Option<RecordSeq>,
        draft: RecordDraft,
    ) -> Result<PromotionRecord, LedgerError> {
        let actual = self.current_seq(&draft.environment);
        if actual != expected {
            return Err(LedgerError::ConcurrentModification {
                environment: draft.environment,
                expected,
                actual,
            });
        }

        if let RecordKind::Rollback { restored } = draft.kind {
            let target = self.record(restored)?;
            if target.environment != draft.environment {
                return Err(LedgerError::UnknownRecord(restored));
            }
        }

        let record = PromotionRecord {
            seq: RecordSeq::from_index(self.records.len()),
            environment: draft.environment,
            artifact: draft.artifact,
            promoted_at: Utc::now(),
            promoted_by: draft.promoted_by,
            previous: actual,
            kind: draft.kind,
        };
        self.current.insert(record.environment.clone(), record.seq);
        self.records.push(record.clone());
        Ok(record)
    }

    pub(crate) fn records_for_artifact(&self, digest: &Digest) -> Vec<PromotionRecord> {
        self.records
            .iter()
            .filter(|r| r.artifact.digest() == digest)
            .cloned()
            .collect()
    }

    pub(crate) fn environments(&self) -> Vec<EnvironmentName> {
        self.current.keys().cloned().collect()
    }

    pub(crate) fn latest_gate_result(
        &self,
        digest: &Digest,
        environment: &EnvironmentName,
    ) -> Option<GateResult> {
        self.gate_results
            .iter()
            .rev()
            .find(|g| g.artifact().digest() == digest && g.environment() == environment)
            .cloned()
    }

    pub(crate) fn record_gate_result(&mut self, result: GateResult) {
        self.gate_results.push(result);
    }

    /// Structural checks applied when loading a stored ledger.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.format != FORMAT_VERSION {
            return Err(format!("unsupported ledger format {}", self.format));
        }
        for (index, record) in self.records.iter().enumerate() {
            if record.seq != RecordSeq::from_index(index) {
                return Err(format!(
                    "record at position {} has sequence {}",
                    index, record.seq
                ));
            }
            if let Some(previous) = record.previous {
                let linked = previous < record.seq
                    && self.records[previous.index()].environment == record.environment;
                if !linked {
                    return Err(format!(
                        "record {} links to {} outside its environment",
                        record.seq, previous
                    ));
                }
            }
        }
        for (environment, seq) in &self.current {
            match self.records.get(seq.index()) {
                Some(record) if &record.environment == environment => {}
                _ => {
                    return Err(format!(
                        "current record {} for {} does not exist",
                        seq, environment
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::types::{Actor, SemanticVersion, SourceRevision};

    fn artifact(n: u8) -> Artifact {
        Artifact::from_parts(
            Digest::parse(&format!("sha256:{}", format!("{:02x}", n).repeat(32))).unwrap(),
            SemanticVersion::parse(&format!("1.0.{n}")).unwrap(),
            SourceRevision::new("abc1234").unwrap(),
            Utc::now(),
        )
    }

    fn draft(env: &str, n: u8) -> RecordDraft {
        RecordDraft {
            environment: EnvironmentName::new(env).unwrap(),
            artifact: artifact(n),
            promoted_by: Actor::new("alice").unwrap(),
            kind: RecordKind::Promotion,
        }
    }

    #[test]
    fn append_links_to_previous_in_same_environment() {
        let mut state = LedgerState::default();
        let first = state.append(None, draft("dev", 1)).unwrap();
        let other = state.append(None, draft("staging", 1)).unwrap();
        let second = state.append(Some(first.seq), draft("dev", 2)).unwrap();

        assert_eq!(first.previous, None);
        assert_eq!(other.previous, None);
        assert_eq!(second.previous, Some(first.seq));
        assert_eq!(second.seq, RecordSeq::new(3).unwrap());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn stale_expectation_is_rejected_without_change() {
        let mut state = LedgerState::default();
        state.append(None, draft("dev", 1)).unwrap();

        let err = state.append(None, draft("dev", 2)).unwrap_err();
        assert!(matches!(err, LedgerError::ConcurrentModification { .. }));
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn rollback_must_restore_record_from_same_environment() {
        let mut state = LedgerState::default();
        let dev = state.append(None, draft("dev", 1)).unwrap();
        let staging = state.append(None, draft("staging", 1)).unwrap();

        let mut rollback = draft("staging", 1);
        rollback.kind = RecordKind::Rollback { restored: dev.seq };
        let err = state.append(Some(staging.seq), rollback).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownRecord(_)));
    }

    #[test]
    fn validate_rejects_dangling_current_pointer() {
        let mut state = LedgerState::default();
        state
            .current
            .insert(EnvironmentName::new("dev").unwrap(), RecordSeq::new(4).unwrap());
        assert!(state.validate().is_err());
    }
}
