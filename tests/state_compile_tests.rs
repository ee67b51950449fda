// ABOUTME: Trybuild runner for compile-time type safety tests.
// ABOUTME: Verifies that skipping the gate or promoting unbuilt artifacts fails to compile.

#[test]
fn pending_hop_cannot_commit() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/commit_pending_hop.rs");
}

#[test]
fn rejected_hop_cannot_commit() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/commit_failed_hop.rs");
}

#[test]
fn unbuilt_artifact_cannot_be_promoted() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/promote_unbuilt_artifact.rs");
}
