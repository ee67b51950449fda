// ABOUTME: Compile-fail test verifying a hop cannot be committed before its gate.
// ABOUTME: This test should fail to compile, validating state machine safety.

use hoist::artifact::Artifact;
use hoist::ledger::MemoryLedger;
use hoist::promote::Hop;
use hoist::types::{Actor, EnvironmentName};

fn try_commit_ungated(artifact: Artifact, ledger: &MemoryLedger) {
    let hop = Hop::new(
        artifact,
        EnvironmentName::new("dev").unwrap(),
        Actor::new("ci").unwrap(),
        None,
    );

    // ERROR: commit() method doesn't exist on Hop<Pending>
    let _ = hop.commit(ledger);
}

fn main() {}
