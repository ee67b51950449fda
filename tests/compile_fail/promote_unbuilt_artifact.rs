// ABOUTME: Compile-fail test verifying an artifact without a digest cannot be promoted.
// ABOUTME: This test should fail to compile, validating artifact state safety.

use hoist::promote::PromoteRequest;
use hoist::types::{Actor, EnvironmentName};
use hoist::version::resolve;

fn main() {
    let resolved = resolve("abc1234", None).unwrap();

    // ERROR: expected Artifact<Built>, found Artifact<Resolved>
    let _ = PromoteRequest::new(
        resolved,
        EnvironmentName::new("dev").unwrap(),
        Actor::new("ci").unwrap(),
    );
}
