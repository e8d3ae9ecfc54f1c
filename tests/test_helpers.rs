//! Test helpers and utilities for integration tests

use agent_swarm::agent::Agent;
use agent_swarm::handoff::{HandoffConfig, HandoffCoordinator, RetryPolicy};
use agent_swarm::routing::TaskRouter;
use agent_swarm::testing::{RecordingDelay, RecordingEventSink, RecordingHooks};
use std::sync::Arc;
use std::time::Duration;

/// The coder/reviewer pool used across scenarios
#[allow(dead_code)]
pub fn coder_reviewer_router() -> TaskRouter {
    let router = TaskRouter::new();
    router.register(
        Agent::new("coder", "Coder", 5)
            .with_type("coding")
            .with_expertise(["coding", "rust"]),
    );
    router.register(
        Agent::new("reviewer", "Reviewer", 5)
            .with_type("review")
            .with_expertise(["review", "quality"]),
    );
    router
}

/// Coordinator wired to recording doubles; waits return immediately
#[allow(dead_code)]
pub struct Harness {
    pub coordinator: HandoffCoordinator,
    pub hooks: Arc<RecordingHooks>,
    pub events: Arc<RecordingEventSink>,
    pub delay: Arc<RecordingDelay>,
}

#[allow(dead_code)]
pub fn harness(max_retries: u32) -> Harness {
    harness_with_hooks(max_retries, Arc::new(RecordingHooks::new()))
}

#[allow(dead_code)]
pub fn harness_with_hooks(max_retries: u32, hooks: Arc<RecordingHooks>) -> Harness {
    let events = Arc::new(RecordingEventSink::new());
    let delay = Arc::new(RecordingDelay::new());
    let coordinator = HandoffCoordinator::new(HandoffConfig::default())
        .with_retry_policy(RetryPolicy::exponential(
            max_retries,
            Duration::from_millis(100),
        ))
        .with_hooks(hooks.clone())
        .with_event_sink(events.clone())
        .with_delay(delay.clone());

    Harness {
        coordinator,
        hooks,
        events,
        delay,
    }
}
