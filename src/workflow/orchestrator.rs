//! Workflow Orchestrator
//!
//! Walks a [`WorkflowGraph`] from its start node, handing each node to a
//! [`NodeProcessor`]. The processor's output fully replaces the context
//! before the next node runs. Every failure is captured in the returned
//! [`WorkflowExecution`] together with the path walked so far.

use super::graph::{WorkflowDefinition, WorkflowEdge, WorkflowGraph, WorkflowNode};
use super::processor::{Context, NodeProcessor};
use super::WorkflowError;
use crate::observability::metrics::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Iteration ceiling for a single run
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// One executed node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub input: Context,
    pub output: Context,
}

/// Mutable state of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowExecutionState {
    pub execution_id: Uuid,
    pub current_node: String,
    pub context: Context,
    pub history: Vec<HistoryRecord>,
    pub started_at: DateTime<Utc>,
}

impl WorkflowExecutionState {
    fn new(start_node: &str, context: Context) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            current_node: start_node.to_string(),
            context,
            history: Vec::new(),
            started_at: Utc::now(),
        }
    }
}

/// Result of [`WorkflowOrchestrator::execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowExecution {
    /// Node ids in visit order, up to and including a failing node
    pub execution_path: Vec<String>,
    pub state: WorkflowExecutionState,
    /// Output of the terminal node, or the failure
    pub outcome: Result<Context, WorkflowError>,
}

impl WorkflowExecution {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn output(&self) -> Option<&Context> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.outcome.as_ref().err()
    }

    /// `{success, result, error, executionPath}` view for callers that speak JSON
    pub fn to_report(&self) -> Value {
        json!({
            "executionId": self.state.execution_id,
            "success": self.is_success(),
            "result": self.output(),
            "error": self.error().map(ToString::to_string),
            "executionPath": self.execution_path,
        })
    }
}

pub struct WorkflowOrchestrator {
    graph: RwLock<WorkflowGraph>,
    start_node: String,
    processor: Arc<dyn NodeProcessor>,
    max_iterations: usize,
}

impl WorkflowOrchestrator {
    pub fn new(start_node: impl Into<String>, processor: Arc<dyn NodeProcessor>) -> Self {
        Self {
            graph: RwLock::new(WorkflowGraph::new()),
            start_node: start_node.into(),
            processor,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Orchestrator over a graph built from a definition
    pub fn from_definition(
        definition: &WorkflowDefinition,
        processor: Arc<dyn NodeProcessor>,
    ) -> Result<Self, WorkflowError> {
        let orchestrator = Self::new(definition.start.clone(), processor);
        *orchestrator.graph.write().unwrap_or_else(PoisonError::into_inner) =
            definition.to_graph()?;
        Ok(orchestrator)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    pub fn add_node(&self, node: WorkflowNode) -> Result<(), WorkflowError> {
        self.graph
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_node(node)
    }

    pub fn add_edge(&self, edge: WorkflowEdge) {
        self.graph
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_edge(edge);
    }

    /// Run the workflow from the start node
    ///
    /// Graph edits made while a run is in flight do not affect that run.
    pub async fn execute(&self, initial_context: Context) -> WorkflowExecution {
        let graph = self
            .graph
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let state = WorkflowExecutionState::new(&self.start_node, initial_context);
        let span = crate::workflow_span!(
            execution_id = %state.execution_id,
            start_node = %self.start_node
        );

        let execution = self.run(&graph, state).instrument(span).await;
        match &execution.outcome {
            Ok(_) => {
                metrics().workflow_completed();
                info!(
                    execution_id = %execution.state.execution_id,
                    steps = execution.execution_path.len(),
                    "Workflow completed"
                );
            }
            Err(e) => {
                metrics().workflow_failed();
                warn!(
                    execution_id = %execution.state.execution_id,
                    steps = execution.execution_path.len(),
                    error = %e,
                    "Workflow failed"
                );
            }
        }
        execution
    }

    async fn run(
        &self,
        graph: &WorkflowGraph,
        mut state: WorkflowExecutionState,
    ) -> WorkflowExecution {
        let mut path = Vec::new();

        if graph.node(&self.start_node).is_none() {
            return Self::finish(
                path,
                state,
                Err(WorkflowError::NodeNotFound {
                    node_id: self.start_node.clone(),
                }),
            );
        }

        for _ in 0..self.max_iterations {
            let Some(node) = graph.node(&state.current_node) else {
                let node_id = state.current_node.clone();
                return Self::finish(path, state, Err(WorkflowError::NodeNotFound { node_id }));
            };
            path.push(node.id.clone());

            let output = match self.processor.process(node, &state.context).await {
                Ok(output) => output,
                Err(e) => return Self::finish(path, state, Err(e)),
            };

            state.history.push(HistoryRecord {
                node_id: node.id.clone(),
                timestamp: Utc::now(),
                input: state.context.clone(),
                output: output.clone(),
            });

            match graph.first_outbound(&node.id) {
                None => {
                    state.context = output.clone();
                    return Self::finish(path, state, Ok(output));
                }
                Some(edge) => {
                    debug!(from = %node.id, to = %edge.target, "Following edge");
                    state.current_node = edge.target.clone();
                    state.context = output;
                }
            }
        }

        Self::finish(
            path,
            state,
            Err(WorkflowError::IterationLimitExceeded {
                limit: self.max_iterations,
            }),
        )
    }

    fn finish(
        execution_path: Vec<String>,
        state: WorkflowExecutionState,
        outcome: Result<Context, WorkflowError>,
    ) -> WorkflowExecution {
        WorkflowExecution {
            execution_path,
            state,
            outcome,
        }
    }
}
