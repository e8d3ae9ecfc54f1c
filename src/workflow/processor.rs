//! Node processing capability
//!
//! The orchestrator hands each node and its incoming context to a
//! `NodeProcessor` and carries the returned context to the next node.

use super::graph::{NodeKind, WorkflowNode};
use super::WorkflowError;
use crate::routing::{Task, TaskRouter};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Key/value payload carried between nodes
pub type Context = Map<String, Value>;

#[async_trait]
pub trait NodeProcessor: Send + Sync {
    /// Produce the node's output from its input; the output replaces the context
    async fn process(&self, node: &WorkflowNode, input: &Context) -> Result<Context, WorkflowError>;
}

/// Stand-in for real work: waits a bounded random time and annotates the context
#[derive(Debug, Clone, Default)]
pub struct SimulatedProcessor {
    max_latency: Duration,
    fixed_decision: Option<bool>,
}

impl SimulatedProcessor {
    pub fn new(max_latency: Duration) -> Self {
        Self {
            max_latency,
            fixed_decision: None,
        }
    }

    /// Always take this branch outcome at decision nodes
    pub fn with_decision(mut self, decision: bool) -> Self {
        self.fixed_decision = Some(decision);
        self
    }

    async fn simulate_latency(&self) {
        let max_ms = self.max_latency.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        let delay_ms = rand::thread_rng().gen_range(0..=max_ms);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    fn annotate(&self, node: &WorkflowNode, input: &Context, processed_by: &str) -> Context {
        let mut output = input.clone();
        output.insert("processedBy".to_string(), Value::from(processed_by));
        output.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        output.insert(
            "result".to_string(),
            Value::from(format!("{} node '{}' completed", node.kind, node.id)),
        );
        if node.kind == NodeKind::Decision {
            let decision = self
                .fixed_decision
                .unwrap_or_else(|| rand::thread_rng().gen_bool(0.5));
            output.insert("decision".to_string(), Value::Bool(decision));
        }
        output
    }
}

#[async_trait]
impl NodeProcessor for SimulatedProcessor {
    async fn process(
        &self,
        node: &WorkflowNode,
        input: &Context,
    ) -> Result<Context, WorkflowError> {
        self.simulate_latency().await;
        Ok(self.annotate(node, input, &node.label))
    }
}

/// Routes `agent` nodes through a [`TaskRouter`]; other nodes are simulated
///
/// The agent's slot is reserved for the duration of the node and released
/// afterwards. The task description is the node label, followed by the
/// context's `description` field when present.
pub struct RoutedProcessor {
    router: Arc<TaskRouter>,
    inner: SimulatedProcessor,
}

impl RoutedProcessor {
    pub fn new(router: Arc<TaskRouter>, inner: SimulatedProcessor) -> Self {
        Self { router, inner }
    }

    fn task_for(node: &WorkflowNode, input: &Context) -> Task {
        let description = match input.get("description").and_then(Value::as_str) {
            Some(extra) => format!("{} {}", node.label, extra),
            None => node.label.clone(),
        };
        Task::new(format!("workflow-node:{}", node.id), description)
            .with_type(node.kind.to_string())
    }
}

#[async_trait]
impl NodeProcessor for RoutedProcessor {
    async fn process(
        &self,
        node: &WorkflowNode,
        input: &Context,
    ) -> Result<Context, WorkflowError> {
        if node.kind != NodeKind::Agent {
            return self.inner.process(node, input).await;
        }

        let task = Self::task_for(node, input);
        let reservation = self
            .router
            .reserve(&task)
            .map_err(|e| WorkflowError::processing_failed(&node.id, e.to_string()))?;
        let agent = &reservation.decision.agent;
        let _slot = SlotGuard {
            router: Arc::clone(&self.router),
            agent_id: reservation.reserved.then(|| agent.id.clone()),
        };
        debug!(node_id = %node.id, agent_id = %agent.id, "Agent node assigned");

        self.inner.simulate_latency().await;
        let mut output = self.inner.annotate(node, input, &agent.name);
        output.insert("agentId".to_string(), Value::from(agent.id.clone()));
        Ok(output)
    }
}

/// Releases a reserved slot when the node finishes or its future is dropped
struct SlotGuard {
    router: Arc<TaskRouter>,
    agent_id: Option<String>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(agent_id) = self.agent_id.take() {
            self.router.release(&agent_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;

    #[tokio::test]
    async fn test_simulated_process_node_annotates_copy() {
        let processor = SimulatedProcessor::default();
        let mut input = Context::new();
        input.insert("k".to_string(), Value::from(1));

        let output = processor
            .process(&WorkflowNode::process("p", "parse"), &input)
            .await
            .unwrap();

        assert_eq!(output["k"], 1);
        assert_eq!(output["processedBy"], "parse");
        assert!(output.contains_key("timestamp"));
        assert!(output.contains_key("result"));
        assert!(!output.contains_key("decision"));
        assert_eq!(input.len(), 1);
    }

    #[tokio::test]
    async fn test_decision_node_records_outcome() {
        let processor = SimulatedProcessor::default().with_decision(false);
        let output = processor
            .process(&WorkflowNode::decision("d", "gate"), &Context::new())
            .await
            .unwrap();
        assert_eq!(output["decision"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_bounded() {
        let processor = SimulatedProcessor::new(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        processor
            .process(&WorkflowNode::agent("a", "work"), &Context::new())
            .await
            .unwrap();
        assert!(started.elapsed() <= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_routed_agent_node_uses_router_and_releases() {
        let router = Arc::new(TaskRouter::new());
        router.register(Agent::new("coder", "Coder", 1).with_expertise(["coding"]));
        router.register(Agent::new("writer", "Writer", 1).with_expertise(["docs"]));
        let processor = RoutedProcessor::new(router.clone(), SimulatedProcessor::default());

        let output = processor
            .process(&WorkflowNode::agent("n1", "coding task"), &Context::new())
            .await
            .unwrap();

        assert_eq!(output["processedBy"], "Coder");
        assert_eq!(output["agentId"], "coder");
        assert_eq!(router.registry().get("coder").unwrap().workload, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_agent_node_releases_slot() {
        let router = Arc::new(TaskRouter::new());
        router.register(Agent::new("coder", "Coder", 1).with_expertise(["coding"]));
        let processor = RoutedProcessor::new(
            router.clone(),
            SimulatedProcessor::new(Duration::from_secs(10)),
        );
        let node = WorkflowNode::agent("n1", "coding task");
        let input = Context::new();

        let mut run = Box::pin(processor.process(&node, &input));
        if futures::poll!(run.as_mut()).is_pending() {
            assert_eq!(router.registry().get("coder").unwrap().workload, 1);
        }
        drop(run);

        assert_eq!(router.registry().get("coder").unwrap().workload, 0);
    }

    #[tokio::test]
    async fn test_routed_agent_node_without_agents_fails() {
        let processor =
            RoutedProcessor::new(Arc::new(TaskRouter::new()), SimulatedProcessor::default());
        let err = processor
            .process(&WorkflowNode::agent("n1", "coding"), &Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ProcessingFailed { .. }));
    }
}
