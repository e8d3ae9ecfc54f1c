//! Routing behavior and invariants
//!
//! Scenario tests for the coder/reviewer pool plus property tests for the
//! capacity and memory-size invariants.

mod test_helpers;

use agent_swarm::agent::Agent;
use agent_swarm::routing::{RoutingMemory, RoutingSource, Task, TaskRouter};
use agent_swarm::SwarmError;
use proptest::prelude::*;
use std::sync::Arc;
use test_helpers::coder_reviewer_router;

#[test]
fn test_coding_task_goes_to_coder() {
    let router = coder_reviewer_router();
    let decision = router
        .route(&Task::new("t-1", "Implement the rust coding exercise"))
        .unwrap();

    assert_eq!(decision.agent.id, "coder");
    assert_eq!(decision.source, RoutingSource::Scored);
    assert!(decision.reasoning.contains("Coder"));
}

#[test]
fn test_repeat_task_served_from_memory() {
    let router = coder_reviewer_router();
    let first = router
        .route(&Task::new("t-1", "Implement the rust coding exercise"))
        .unwrap();
    // Same id, unrelated description: memory wins while the agent has room
    let second = router
        .route(&Task::new("t-1", "quality review"))
        .unwrap();

    assert_eq!(second.agent.id, first.agent.id);
    assert_eq!(second.source, RoutingSource::Memory);
}

#[test]
fn test_memory_skipped_when_agent_full() {
    let router = coder_reviewer_router();
    router
        .route(&Task::new("t-1", "Implement the rust coding exercise"))
        .unwrap();
    router.update_workload("coder", 5);

    let decision = router.route(&Task::new("t-1", "anything")).unwrap();
    assert_eq!(decision.agent.id, "reviewer");
    assert_eq!(decision.source, RoutingSource::Scored);
}

#[test]
fn test_all_full_falls_back_to_least_loaded() {
    let router = TaskRouter::new();
    router.register(Agent::new("a", "A", 2).with_workload(3));
    router.register(Agent::new("b", "B", 2).with_workload(2));

    let decision = router.route(&Task::new("t", "coding")).unwrap();
    assert_eq!(decision.agent.id, "b");
    assert_eq!(decision.source, RoutingSource::Fallback);
    assert_eq!(decision.confidence, 0.3);
}

#[test]
fn test_empty_pool_fails() {
    let router = TaskRouter::new();
    assert!(matches!(
        router.route(&Task::new("t", "anything")),
        Err(SwarmError::NoAgents)
    ));
}

#[test]
fn test_reservations_never_oversubscribe() {
    let router = Arc::new(TaskRouter::new());
    router.register(Agent::new("solo", "Solo", 3));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let router = Arc::clone(&router);
            std::thread::spawn(move || {
                router
                    .reserve(&Task::new(format!("t-{i}"), "work"))
                    .unwrap()
                    .reserved
            })
        })
        .collect();

    let reserved = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| *r)
        .count();
    assert_eq!(reserved, 3);
    assert_eq!(router.registry().get("solo").unwrap().workload, 3);

    assert!(router.release("solo"));
    assert_eq!(router.registry().get("solo").unwrap().workload, 2);
}

proptest! {
    #[test]
    fn prop_scored_decisions_respect_capacity(
        workloads in prop::collection::vec((0u32..6, 1u32..6), 1..8),
        description in "[a-z ]{0,30}",
    ) {
        let router = TaskRouter::new();
        for (i, (workload, capacity)) in workloads.iter().enumerate() {
            router.register(
                Agent::new(format!("agent-{i}"), format!("Agent {i}"), *capacity)
                    .with_workload(*workload)
                    .with_expertise(["alpha", "beta"]),
            );
        }

        let decision = router.route(&Task::new("t", description)).unwrap();
        let any_free = workloads.iter().any(|(w, c)| w < c);
        if any_free {
            prop_assert_eq!(decision.source, RoutingSource::Scored);
            prop_assert!(decision.agent.has_capacity());
        } else {
            prop_assert_eq!(decision.source, RoutingSource::Fallback);
            let min = workloads.iter().map(|(w, _)| *w).min().unwrap();
            prop_assert_eq!(decision.agent.workload, min);
        }
        prop_assert!((0.0..=1.0).contains(&decision.confidence));
    }

    #[test]
    fn prop_memory_never_exceeds_cap(
        capacity in 0usize..20,
        task_ids in prop::collection::vec("[a-z]{1,4}", 0..60),
    ) {
        let memory = RoutingMemory::new(capacity, 600);
        for task_id in &task_ids {
            memory.record(task_id, "agent");
            prop_assert!(memory.len() <= capacity);
        }
    }
}
