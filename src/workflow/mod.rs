//! Workflow graphs and their execution
//!
//! A workflow is a directed graph of typed nodes walked from a start node
//! until a node with no outbound edge is reached. Only the first outbound
//! edge of each node is followed. Runs are bounded by an iteration ceiling
//! and always return a `WorkflowExecution` value, never an error.

pub mod graph;
pub mod orchestrator;
pub mod processor;

pub use graph::{
    EdgeDefinition, NodeDefinition, NodeKind, WorkflowDefinition, WorkflowEdge, WorkflowGraph,
    WorkflowNode,
};
pub use orchestrator::{
    HistoryRecord, WorkflowExecution, WorkflowExecutionState, WorkflowOrchestrator,
    DEFAULT_MAX_ITERATIONS,
};
pub use processor::{Context, NodeProcessor, RoutedProcessor, SimulatedProcessor};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Unknown node type: {tag}")]
    UnknownNodeType { tag: String },

    #[error("Iteration limit of {limit} exceeded")]
    IterationLimitExceeded { limit: usize },

    #[error("Node already exists: {node_id}")]
    DuplicateNode { node_id: String },

    #[error("Node {node_id} failed: {message}")]
    ProcessingFailed { node_id: String, message: String },

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),
}

impl WorkflowError {
    pub fn processing_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }
}
