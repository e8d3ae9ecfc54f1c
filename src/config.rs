//! Swarm configuration
//!
//! One TOML file describes the agent pool, the runtimes handoffs can target
//! and the tunables of each component. Every section is optional; missing
//! values take the defaults below. Secrets are never stored in the file:
//! `api_key_env` names the environment variable holding a runtime's key.

use crate::agent::Agent;
use crate::consensus::ConsensusEngine;
use crate::handoff::{ContextTransfer, HandoffConfig, HandoffCoordinator, RetryPolicy};
use crate::routing::{RoutingMemory, TaskRouter};
use crate::runtime::{AgentRuntime, OpenAiCompatConfig, OpenAiCompatRuntime, RuntimeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SwarmConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub consensus: ConsensusSection,
    #[serde(default)]
    pub handoff: HandoffSection,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub runtimes: Vec<RuntimeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterSection {
    /// Routing memory cap (entries)
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Routing memory lookup window
    #[serde(default = "default_memory_ttl_secs")]
    pub memory_ttl_secs: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            memory_ttl_secs: default_memory_ttl_secs(),
        }
    }
}

fn default_memory_capacity() -> usize {
    1000
}

fn default_memory_ttl_secs() -> u64 {
    600 // 10 minutes
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Upper bound of simulated per-node work; 0 disables the wait
    #[serde(default)]
    pub max_step_latency_ms: u64,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_step_latency_ms: 0,
        }
    }
}

fn default_max_iterations() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusSection {
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
            max_sessions: default_max_sessions(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_threshold() -> f64 {
    0.66
}

fn default_max_sessions() -> usize {
    1000
}

fn default_session_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffSection {
    #[serde(default = "default_true")]
    pub enable_evaluation: bool,
    /// Runtime label consulted by `evaluate`
    pub evaluator: Option<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_latency_target_ms")]
    pub latency_target_ms: u64,
    #[serde(default = "default_transfer_ttl_secs")]
    pub transfer_ttl_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for HandoffSection {
    fn default() -> Self {
        Self {
            enable_evaluation: true,
            evaluator: None,
            confidence_threshold: default_confidence_threshold(),
            latency_target_ms: default_latency_target_ms(),
            transfer_ttl_secs: default_transfer_ttl_secs(),
            retry: RetrySection::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_latency_target_ms() -> u64 {
    2000
}

fn default_transfer_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_true")]
    pub exponential: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            exponential: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

/// One routable agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEntry {
    /// Agent identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Display name; defaults to the id
    pub name: Option<String>,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    5
}

impl AgentEntry {
    pub fn to_agent(&self) -> Agent {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        Agent::new(self.id.clone(), name, self.capacity)
            .with_type(self.agent_type.clone())
            .with_expertise(self.expertise.iter().cloned())
    }
}

/// One OpenAI-compatible runtime a handoff can target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeEntry {
    pub label: String,
    #[serde(default)]
    pub kind: RuntimeKind,
    pub base_url: String,
    pub model: String,
    /// Secondary local runtime label used when this one is unavailable
    pub fallback: Option<String>,
    /// Environment variable containing the API key
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl RuntimeEntry {
    /// Connection settings with the API key resolved from the environment
    pub fn runtime_config(&self) -> OpenAiCompatConfig {
        OpenAiCompatConfig {
            name: self.label.clone(),
            kind: self.kind,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok()),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SwarmConfig {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            agents = config.agents.len(),
            runtimes = config.runtimes.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SwarmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML (for `config --show`)
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("consensus.default_threshold", self.consensus.default_threshold)?;
        check_fraction(
            "handoff.confidence_threshold",
            self.handoff.confidence_threshold,
        )?;
        if self.handoff.transfer_ttl_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "handoff.transfer_ttl_secs must be at least 1".to_string(),
            ));
        }
        if self.workflow.max_iterations == 0 {
            return Err(ConfigError::InvalidConfig(
                "workflow.max_iterations must be at least 1".to_string(),
            ));
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            validate_agent_id(&agent.id)?;
            if !agent_ids.insert(agent.id.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
            if agent.capacity == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "agent '{}' must have a capacity of at least 1",
                    agent.id
                )));
            }
        }

        let labels: HashSet<&str> = self.runtimes.iter().map(|r| r.label.as_str()).collect();
        if labels.len() != self.runtimes.len() {
            return Err(ConfigError::InvalidConfig(
                "runtime labels must be unique".to_string(),
            ));
        }
        for runtime in &self.runtimes {
            if runtime.base_url.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "runtime '{}' has an empty base_url",
                    runtime.label
                )));
            }
            if let Some(fallback) = &runtime.fallback {
                if fallback == &runtime.label || !labels.contains(fallback.as_str()) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "runtime '{}' names unknown fallback '{}'",
                        runtime.label, fallback
                    )));
                }
            }
        }
        if let Some(evaluator) = &self.handoff.evaluator {
            if !labels.contains(evaluator.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "handoff.evaluator '{evaluator}' is not a configured runtime"
                )));
            }
        }

        Ok(())
    }

    /// Router with every configured agent registered
    pub fn build_router(&self) -> TaskRouter {
        let router = TaskRouter::with_memory(RoutingMemory::new(
            self.router.memory_capacity,
            self.router.memory_ttl_secs,
        ));
        for entry in &self.agents {
            router.register(entry.to_agent());
        }
        router
    }

    pub fn build_consensus_engine(&self) -> ConsensusEngine {
        let engine = ConsensusEngine::new(
            self.consensus.default_threshold,
            self.consensus.max_sessions,
            Duration::from_secs(self.consensus.session_ttl_secs),
        );
        for entry in &self.agents {
            engine.register_agent(entry.to_agent());
        }
        engine
    }

    pub fn handoff_config(&self) -> HandoffConfig {
        HandoffConfig {
            enable_evaluation: self.handoff.enable_evaluation,
            evaluator: self.handoff.evaluator.clone(),
            confidence_threshold: self.handoff.confidence_threshold,
            latency_target: Duration::from_millis(self.handoff.latency_target_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.handoff.retry.max_retries,
            base_delay: Duration::from_millis(self.handoff.retry.base_delay_ms),
            exponential: self.handoff.retry.exponential,
        }
    }

    /// One HTTP runtime per `[[runtimes]]` entry, keyed by label
    pub fn build_runtimes(
        &self,
    ) -> Result<Vec<(RuntimeEntry, Arc<dyn AgentRuntime>)>, ConfigError> {
        self.runtimes
            .iter()
            .map(|entry| {
                let runtime = OpenAiCompatRuntime::new(entry.runtime_config()).map_err(|e| {
                    ConfigError::InvalidConfig(format!("runtime '{}': {e}", entry.label))
                })?;
                Ok((entry.clone(), Arc::new(runtime) as Arc<dyn AgentRuntime>))
            })
            .collect()
    }

    /// Coordinator with every configured runtime registered
    pub fn build_coordinator(&self) -> Result<HandoffCoordinator, ConfigError> {
        let coordinator = HandoffCoordinator::new(self.handoff_config())
            .with_retry_policy(self.retry_policy());
        for (entry, runtime) in self.build_runtimes()? {
            match entry.fallback {
                Some(fallback) => {
                    coordinator.register_agent_with_fallback(entry.label, runtime, fallback)
                }
                None => coordinator.register_agent(entry.label, runtime),
            }
        }
        Ok(coordinator)
    }

    /// Transfer table and blob store share `handoff.transfer_ttl_secs`
    pub fn build_context_transfer(&self) -> ContextTransfer {
        ContextTransfer::gzip(Duration::from_secs(self.handoff.transfer_ttl_secs))
    }
}

fn check_fraction(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidConfig(format!(
            "{field} must be within [0, 1], got {value}"
        )))
    }
}

fn validate_agent_id(agent_id: &str) -> Result<(), ConfigError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentId(format!(
            "Agent ID '{agent_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
