// ABOUTME: Ledger sequence numbers.
// ABOUTME: Monotonically increasing from 1; each promotion record owns exactly one.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSeq(u64);

impl RecordSeq {
    pub const FIRST: RecordSeq = RecordSeq(1);

    pub fn new(value: u64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    /// Sequence number of the record stored at arena position `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index as u64 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Zero-based position of the record in the ledger arena.
    pub fn index(self) -> usize {
        self.0.saturating_sub(1) as usize
    }
}

impl fmt::Display for RecordSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
