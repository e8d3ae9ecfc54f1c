use super::WorkflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Node variants a workflow can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Work performed by an agent
    Agent,
    /// Plain processing step
    Process,
    /// Branch point; records a boolean outcome
    Decision,
}

impl FromStr for NodeKind {
    type Err = WorkflowError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(NodeKind::Agent),
            "process" => Ok(NodeKind::Process),
            "decision" => Ok(NodeKind::Decision),
            _ => Err(WorkflowError::UnknownNodeType {
                tag: tag.to_string(),
            }),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            NodeKind::Agent => "agent",
            NodeKind::Process => "process",
            NodeKind::Decision => "decision",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
        }
    }

    pub fn agent(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Agent, label)
    }

    pub fn process(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Process, label)
    }

    pub fn decision(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Decision, label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl WorkflowEdge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Directed graph of workflow nodes
///
/// Edges may reference nodes that were never added; such a graph is
/// accepted and fails with `NodeNotFound` when a run reaches the gap.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    nodes: HashMap<String, WorkflowNode>,
    edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes are immutable once added; re-adding an id is rejected
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), WorkflowError> {
        if self.nodes.contains_key(&node.id) {
            return Err(WorkflowError::DuplicateNode { node_id: node.id });
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: WorkflowEdge) {
        self.edges.push(edge);
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    /// First edge added with `source == node_id`
    pub fn first_outbound(&self, node_id: &str) -> Option<&WorkflowEdge> {
        self.edges.iter().find(|edge| edge.source == node_id)
    }

    pub fn edges(&self) -> &[WorkflowEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Serialized node with a free-form type tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

/// Workflow described as data, e.g. a TOML file:
///
/// ```toml
/// start = "fetch"
///
/// [[nodes]]
/// id = "fetch"
/// type = "process"
///
/// [[nodes]]
/// id = "review"
/// type = "agent"
/// label = "code review"
///
/// [[edges]]
/// source = "fetch"
/// target = "review"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub start: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl WorkflowDefinition {
    pub fn from_toml_str(content: &str) -> Result<Self, WorkflowError> {
        toml::from_str(content).map_err(|e| WorkflowError::InvalidDefinition(e.to_string()))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WorkflowError::InvalidDefinition(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Build the graph, rejecting unknown type tags
    pub fn to_graph(&self) -> Result<WorkflowGraph, WorkflowError> {
        let mut graph = WorkflowGraph::new();
        for node in &self.nodes {
            let kind = node.node_type.parse::<NodeKind>()?;
            let label = node.label.clone().unwrap_or_else(|| node.id.clone());
            graph.add_node(WorkflowNode::new(node.id.clone(), kind, label))?;
        }
        for (index, edge) in self.edges.iter().enumerate() {
            let id = edge
                .id
                .clone()
                .unwrap_or_else(|| format!("e{}", index + 1));
            graph.add_edge(WorkflowEdge::new(id, edge.source.clone(), edge.target.clone()));
        }
        Ok(graph)
    }
}
