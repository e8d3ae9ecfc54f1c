//! Agent Registry
//!
//! Thread-safe pool of agents shared by the task router and anything else
//! that reads or adjusts workloads. Registration order is preserved because
//! routing breaks score ties by iteration order.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// A worker in the swarm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    /// Agent identifier
    pub id: String,
    /// Display name, also used as the handoff label
    pub name: String,
    /// Free-form type tag (e.g. "coding", "review")
    #[serde(default)]
    pub agent_type: String,
    /// Expertise keywords matched against task descriptions
    #[serde(default)]
    pub expertise: Vec<String>,
    /// Outstanding work currently assigned
    #[serde(default)]
    pub workload: u32,
    /// Maximum concurrent work
    pub capacity: u32,
}

impl Agent {
    /// Create an agent with no expertise and zero workload
    pub fn new(id: impl Into<String>, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: String::new(),
            expertise: Vec::new(),
            workload: 0,
            capacity,
        }
    }

    pub fn with_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    pub fn with_expertise<I, S>(mut self, expertise: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expertise = expertise.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.workload = workload;
        self
    }

    /// Eligible for new work only while `workload < capacity`
    pub fn has_capacity(&self) -> bool {
        self.workload < self.capacity
    }

    /// `1 - workload/capacity`, clamped to [0, 1]
    pub fn workload_factor(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (1.0 - self.workload as f64 / self.capacity as f64).clamp(0.0, 1.0)
    }

    /// Fraction of expertise keywords found in the description (case-insensitive substring)
    pub fn expertise_score(&self, description: &str) -> f64 {
        if self.expertise.is_empty() {
            return 0.0;
        }

        let description = description.to_lowercase();
        let matched = self
            .expertise
            .iter()
            .filter(|keyword| description.contains(&keyword.to_lowercase()))
            .count();

        matched as f64 / self.expertise.len() as f64
    }
}

/// Thread-safe, order-preserving registry of agents
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<Vec<Agent>>>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an agent; a replaced agent keeps its position
    pub fn register(&self, agent: Agent) {
        let mut agents = self.write();
        match agents.iter_mut().find(|existing| existing.id == agent.id) {
            Some(existing) => {
                debug!(agent_id = %agent.id, "Updated agent registration");
                *existing = agent;
            }
            None => {
                info!(agent_id = %agent.id, capacity = agent.capacity, "Registered new agent");
                agents.push(agent);
            }
        }
    }

    /// Remove an agent, returning it if it was present
    pub fn unregister(&self, agent_id: &str) -> Option<Agent> {
        let mut agents = self.write();
        let position = agents.iter().position(|agent| agent.id == agent_id)?;
        info!(agent_id = %agent_id, "Unregistered agent");
        Some(agents.remove(position))
    }

    /// Set an agent's workload; returns false for unknown agents
    pub fn update_workload(&self, agent_id: &str, workload: u32) -> bool {
        let mut agents = self.write();
        match agents.iter_mut().find(|agent| agent.id == agent_id) {
            Some(agent) => {
                debug!(
                    agent_id = %agent_id,
                    old = agent.workload,
                    new = workload,
                    "Workload updated"
                );
                agent.workload = workload;
                true
            }
            None => {
                warn!(agent_id = %agent_id, "Workload update for unknown agent");
                false
            }
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<Agent> {
        self.read().iter().find(|agent| agent.id == agent_id).cloned()
    }

    /// Snapshot of all agents in registration order
    pub fn agents(&self) -> Vec<Agent> {
        self.read().clone()
    }

    /// Agents with spare capacity, in registration order
    pub fn available_agents(&self) -> Vec<Agent> {
        self.read()
            .iter()
            .filter(|agent| agent.has_capacity())
            .cloned()
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<Agent>> {
        self.agents.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<Agent>> {
        self.agents.write().unwrap_or_else(PoisonError::into_inner)
    }
}
