// ABOUTME: Compile-fail test verifying a gate-rejected hop cannot reach the ledger.
// ABOUTME: This test should fail to compile, validating state machine safety.

use hoist::ledger::MemoryLedger;
use hoist::promote::{GateFailed, Hop};

fn try_commit_rejected(hop: Hop<GateFailed>, ledger: &MemoryLedger) {
    // ERROR: commit() method doesn't exist on Hop<GateFailed>
    let _ = hop.commit(ledger);
}

fn main() {}
