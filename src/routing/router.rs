//! Task Router
//!
//! Mixture-of-experts style routing: each agent with spare capacity is scored
//! by how well its expertise matches the task description, blended with how
//! idle it is. Recent decisions are remembered so repeat lookups for the same
//! task stay on the same agent while it still has room.
//!
//! # Example
//!
//! ```rust
//! use agent_swarm::agent::Agent;
//! use agent_swarm::routing::{Task, TaskRouter};
//!
//! let router = TaskRouter::new();
//! router.register(Agent::new("coder", "Coder", 5).with_expertise(["coding"]));
//! router.register(Agent::new("reviewer", "Reviewer", 5).with_expertise(["review"]));
//!
//! let decision = router
//!     .route(&Task::new("t-1", "Do some coding on the parser"))
//!     .unwrap();
//! assert_eq!(decision.agent.id, "coder");
//! ```

use crate::agent::{Agent, AgentRegistry};
use crate::error::{SwarmError, SwarmResult};
use crate::observability::metrics::metrics;
use crate::routing::memory::RoutingMemory;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const EXPERTISE_WEIGHT: f64 = 0.8;
const WORKLOAD_WEIGHT: f64 = 0.2;
const MEMORY_CONFIDENCE: f64 = 0.9;
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Urgency of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A unit of work submitted for routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            task_type: String::new(),
            priority: TaskPriority::default(),
        }
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Which branch of the routing algorithm produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingSource {
    /// Reused from routing memory
    Memory,
    /// Highest expertise/workload score
    Scored,
    /// Every agent was at capacity
    Fallback,
}

/// The outcome of routing one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub agent: Agent,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reasoning: String,
    pub source: RoutingSource,
}

/// A routing decision whose workload increment was applied atomically
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub decision: RoutingDecision,
    /// False when the decision came from the all-at-capacity fallback
    pub reserved: bool,
}

/// Routes tasks to agents and remembers recent decisions
#[derive(Debug, Default)]
pub struct TaskRouter {
    registry: AgentRegistry,
    memory: RoutingMemory,
}

impl TaskRouter {
    /// Router with an empty pool and default memory settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with a custom routing memory
    pub fn with_memory(memory: RoutingMemory) -> Self {
        Self {
            registry: AgentRegistry::new(),
            memory,
        }
    }

    /// Router over an existing (possibly shared) registry
    pub fn with_registry(registry: AgentRegistry, memory: RoutingMemory) -> Self {
        Self { registry, memory }
    }

    pub fn register(&self, agent: Agent) {
        self.registry.register(agent);
    }

    pub fn unregister(&self, agent_id: &str) -> Option<Agent> {
        self.registry.unregister(agent_id)
    }

    pub fn update_workload(&self, agent_id: &str, workload: u32) -> bool {
        self.registry.update_workload(agent_id, workload)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn memory(&self) -> &RoutingMemory {
        &self.memory
    }

    /// Select the best agent for a task
    ///
    /// Does not change any workload. Concurrent callers may both pick an agent
    /// with one free slot; use [`TaskRouter::reserve`] when the caller is
    /// going to assign the work.
    pub fn route(&self, task: &Task) -> SwarmResult<RoutingDecision> {
        let decision = {
            let agents = self.registry.read();
            self.select(&agents, task)?.1
        };
        self.finish(task, &decision);
        Ok(decision)
    }

    /// Select an agent and increment its workload under one lock
    pub fn reserve(&self, task: &Task) -> SwarmResult<Reservation> {
        let (decision, reserved) = {
            let mut agents = self.registry.write();
            let (index, decision) = self.select(&agents, task)?;
            let agent = &mut agents[index];
            let reserved = agent.has_capacity();
            if reserved {
                agent.workload += 1;
            }
            (decision, reserved)
        };

        self.finish(task, &decision);
        debug!(
            task_id = %task.id,
            agent_id = %decision.agent.id,
            reserved,
            "Reservation made"
        );
        Ok(Reservation { decision, reserved })
    }

    /// Give back a slot taken by [`TaskRouter::reserve`]
    pub fn release(&self, agent_id: &str) -> bool {
        let mut agents = self.registry.write();
        match agents.iter_mut().find(|agent| agent.id == agent_id) {
            Some(agent) => {
                agent.workload = agent.workload.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    fn finish(&self, task: &Task, decision: &RoutingDecision) {
        match decision.source {
            RoutingSource::Memory => metrics().route_memory_hit(),
            RoutingSource::Scored => {
                self.memory.record(&task.id, &decision.agent.id);
                metrics().route_scored();
            }
            RoutingSource::Fallback => metrics().route_fallback(),
        }

        info!(
            task_id = %task.id,
            agent_id = %decision.agent.id,
            confidence = decision.confidence,
            source = ?decision.source,
            "Task routed"
        );
    }

    /// Pure selection over a snapshot of the pool; returns the chosen index
    fn select(&self, agents: &[Agent], task: &Task) -> SwarmResult<(usize, RoutingDecision)> {
        if agents.is_empty() {
            return Err(SwarmError::NoAgents);
        }

        if let Some(entry) = self.memory.lookup(&task.id) {
            if let Some(index) = agents
                .iter()
                .position(|agent| agent.id == entry.agent_id && agent.has_capacity())
            {
                debug!(task_id = %task.id, agent_id = %entry.agent_id, "Routing memory hit");
                return Ok((
                    index,
                    RoutingDecision {
                        agent: agents[index].clone(),
                        confidence: MEMORY_CONFIDENCE,
                        reasoning: "recent routing decision".to_string(),
                        source: RoutingSource::Memory,
                    },
                ));
            }
        }

        let mut best: Option<(usize, f64, f64)> = None;
        for (index, agent) in agents.iter().enumerate() {
            if !agent.has_capacity() {
                continue;
            }
            let expertise = agent.expertise_score(&task.description);
            let score = EXPERTISE_WEIGHT * expertise + WORKLOAD_WEIGHT * agent.workload_factor();
            if best.map_or(true, |(_, best_score, _)| score > best_score) {
                best = Some((index, score, expertise));
            }
        }

        match best {
            Some((index, score, expertise)) => {
                let agent = &agents[index];
                Ok((
                    index,
                    RoutingDecision {
                        agent: agent.clone(),
                        confidence: score.min(1.0),
                        reasoning: format!(
                            "Selected {} (expertise match {:.2}, workload {}/{})",
                            agent.name, expertise, agent.workload, agent.capacity
                        ),
                        source: RoutingSource::Scored,
                    },
                ))
            }
            None => {
                let (index, agent) = agents
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, agent)| agent.workload)
                    .ok_or(SwarmError::NoAgents)?;
                warn!(
                    task_id = %task.id,
                    agent_id = %agent.id,
                    "All agents at capacity, falling back to least loaded"
                );
                Ok((
                    index,
                    RoutingDecision {
                        agent: agent.clone(),
                        confidence: FALLBACK_CONFIDENCE,
                        reasoning: "All agents at capacity".to_string(),
                        source: RoutingSource::Fallback,
                    },
                ))
            }
        }
    }
}
