// ABOUTME: Test support utilities.
// ABOUTME: Fake checks, builders, triggers, and probes plus artifact and engine helpers.

use async_trait::async_trait;
use chrono::Utc;
use hoist::artifact::Artifact;
use hoist::build::{BuildError, BuildRequest, ImageBuilder};
use hoist::collab::{CollaboratorError, DeployTrigger, HealthProbe, HealthReport};
use hoist::environment::Pipeline;
use hoist::event::PromotionEvent;
use hoist::gate::{Check, CheckContext, CheckDefinition, CheckError, CheckReport, PolicyGate, Severity};
use hoist::ledger::MemoryLedger;
use hoist::promote::{PromotionEngine, PromotionPolicy};
use hoist::types::{Actor, Digest, EnvironmentName, SemanticVersion, SourceRevision};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("hoist=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A sha256 digest made of one repeated hex digit.
#[allow(dead_code)]
pub fn digest(fill: char) -> Digest {
    Digest::parse(&format!("sha256:{}", fill.to_string().repeat(64))).unwrap()
}

#[allow(dead_code)]
pub fn artifact(version: &str, fill: char) -> Artifact {
    Artifact::from_parts(
        digest(fill),
        SemanticVersion::parse(version).unwrap(),
        SourceRevision::new("abc1234").unwrap(),
        Utc::now(),
    )
}

#[allow(dead_code)]
pub fn env(name: &str) -> EnvironmentName {
    EnvironmentName::new(name).unwrap()
}

#[allow(dead_code)]
pub fn actor(name: &str) -> Actor {
    Actor::new(name).unwrap()
}

/// dev -> staging -> prod (approval) over a fresh in-memory ledger.
#[allow(dead_code)]
pub fn engine() -> PromotionEngine<MemoryLedger> {
    engine_with(Arc::new(MemoryLedger::new()), PromotionPolicy::default())
}

#[allow(dead_code)]
pub fn engine_with(
    ledger: Arc<MemoryLedger>,
    policy: PromotionPolicy,
) -> PromotionEngine<MemoryLedger> {
    PromotionEngine::new(Pipeline::standard(), ledger, policy)
}

#[allow(dead_code)]
pub fn gate(checks: Vec<(&str, Severity, Arc<FakeCheck>)>) -> PolicyGate {
    PolicyGate::new(
        checks
            .into_iter()
            .map(|(name, threshold, check)| {
                CheckDefinition::new(name, threshold, check as Arc<dyn Check>)
            })
            .collect(),
    )
}

/// A check with a fixed outcome that counts its runs.
#[allow(dead_code)]
pub struct FakeCheck {
    outcome: Result<CheckReport, CheckError>,
    pause: Option<Duration>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeCheck {
    pub fn clean() -> Arc<Self> {
        Self::with(Ok(CheckReport::clean("no findings")))
    }

    pub fn finding(severity: Severity) -> Arc<Self> {
        Self::with(Ok(CheckReport::finding(severity, format!("{severity} finding"))))
    }

    pub fn broken(reason: &str) -> Arc<Self> {
        Self::with(Err(CheckError(reason.to_string())))
    }

    /// Clean, but sleeps first so concurrent callers interleave.
    pub fn clean_after(pause: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(CheckReport::clean("no findings")),
            pause: Some(pause),
            calls: AtomicUsize::new(0),
        })
    }

    fn with(outcome: Result<CheckReport, CheckError>) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            pause: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Check for FakeCheck {
    async fn run(&self, _ctx: CheckContext<'_>) -> Result<CheckReport, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(pause) = self.pause {
            tokio::time::sleep(pause).await;
        }
        self.outcome.clone()
    }
}

/// Returns a fixed digest and keeps every request it saw.
#[allow(dead_code)]
pub struct FakeBuilder {
    digest: Digest,
    pub requests: Mutex<Vec<BuildRequest>>,
}

#[allow(dead_code)]
impl FakeBuilder {
    pub fn new(digest: Digest) -> Arc<Self> {
        Arc::new(Self {
            digest,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<Digest, BuildError> {
        self.requests.lock().push(request.clone());
        Ok(self.digest.clone())
    }
}

/// Records every event; fails every call when `failing`.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingTrigger {
    failing: bool,
    pub events: Mutex<Vec<PromotionEvent>>,
}

#[allow(dead_code)]
impl RecordingTrigger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            events: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DeployTrigger for RecordingTrigger {
    async fn trigger(&self, event: &PromotionEvent) -> Result<(), CollaboratorError> {
        self.events.lock().push(event.clone());
        if self.failing {
            return Err(CollaboratorError::Command {
                command: "deploy.sh".to_string(),
                reason: "exit status 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Answers from a script of healthy/unhealthy replies; repeats the last one.
#[allow(dead_code)]
pub struct ScriptedProbe {
    replies: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn new(replies: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            last: Mutex::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(
        &self,
        artifact: &Artifact,
        _environment: &EnvironmentName,
    ) -> Result<HealthReport, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let healthy = match self.replies.lock().pop_front() {
            Some(reply) => {
                *self.last.lock() = reply;
                reply
            }
            None => *self.last.lock(),
        };
        Ok(if healthy {
            HealthReport::healthy(format!("serving {}", artifact.semantic_version()))
        } else {
            HealthReport::unhealthy("503 Service Unavailable")
        })
    }
}
