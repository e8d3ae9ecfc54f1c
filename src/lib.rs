//! Agent Swarm
//!
//! Coordination primitives for a pool of heterogeneous agents: local
//! inference backends and remote agent services.
//!
//! # Overview
//!
//! - Task routing by expertise and workload, with a routing memory
//! - Bounded workflow graph execution over agent, process and decision nodes
//! - Voting sessions resolved by majority, weighted, supermajority or
//!   unanimous-threshold consensus
//! - Cross-agent handoff with evaluator gating, retry with backoff, local
//!   fallback, lifecycle hooks and compressed context transfer
//!
//! # Quick Start
//!
//! ```rust
//! use agent_swarm::agent::Agent;
//! use agent_swarm::routing::{Task, TaskRouter};
//!
//! let router = TaskRouter::new();
//! router.register(Agent::new("coder", "Coder", 5).with_expertise(["coding", "rust"]));
//! router.register(Agent::new("reviewer", "Reviewer", 5).with_expertise(["review"]));
//!
//! let decision = router
//!     .route(&Task::new("t-1", "Write Rust coding examples"))
//!     .unwrap();
//! assert_eq!(decision.agent.id, "coder");
//! ```

pub mod agent;
pub mod cache;
pub mod compression;
pub mod config;
pub mod consensus;
pub mod error;
pub mod events;
pub mod handoff;
pub mod health;
pub mod observability;
pub mod routing;
pub mod runtime;
pub mod testing;
pub mod workflow;

pub use agent::{Agent, AgentRegistry};
pub use config::{ConfigError, SwarmConfig};
pub use consensus::{ConsensusAlgorithm, ConsensusEngine, ConsensusResult};
pub use error::{SwarmError, SwarmResult};
pub use handoff::{ContextTransfer, HandoffCoordinator, HandoffRequest, RetryPolicy};
pub use routing::{RoutingDecision, Task, TaskRouter};
pub use runtime::{AgentRuntime, RuntimeKind};
pub use workflow::{WorkflowDefinition, WorkflowExecution, WorkflowOrchestrator};
