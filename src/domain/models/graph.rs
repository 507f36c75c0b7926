//! Workflow graph domain model.
//!
//! A workflow is a DAG of task, decision, and join nodes. Validation
//! (entry existence, edge endpoints, acyclicity) happens before any
//! node executes; validation failures are programmer errors and are
//! surfaced as [`GraphError`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutable key-value context threaded through a workflow execution.
///
/// Node outputs land under `node_<id>` and `results.<id>` for edge
/// conditions and downstream runners to consume.
pub type ExecutionContext = serde_json::Map<String, Value>;

/// The kind of work a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Runs the task runner, then the completion gate if required.
    Task,
    /// Synchronously produces an output that selects outgoing edges.
    Decision,
    /// Waits for all predecessors to settle, then passes through.
    Join,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Decision => "decision",
            Self::Join => "join",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with a failed task node's successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Leave successors unscheduled; the branch is stuck.
    Fail,
    /// Release successors as if the node had completed.
    Skip,
    /// Same as `skip`; kept as a separate spelling for graph authors.
    Continue,
}

impl Default for OnError {
    fn default() -> Self {
        Self::Fail
    }
}

impl OnError {
    /// Whether successors are released after a failure.
    pub fn releases_successors(&self) -> bool {
        matches!(self, Self::Skip | Self::Continue)
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Opaque input for the task runner; for decision nodes, the source
    /// of the decision output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Per-node gate requirement; overrides the graph default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_required: Option<bool>,
    #[serde(default)]
    pub on_error: OnError,
}

impl WorkflowNode {
    /// Build a task node with just an id.
    pub fn task(id: impl Into<String>) -> Self {
        Self::with_kind(id, NodeKind::Task)
    }

    /// Build a decision node.
    pub fn decision(id: impl Into<String>, payload: Value) -> Self {
        let mut node = Self::with_kind(id, NodeKind::Decision);
        node.payload = Some(payload);
        node
    }

    /// Build a join node.
    pub fn join(id: impl Into<String>) -> Self {
        Self::with_kind(id, NodeKind::Join)
    }

    fn with_kind(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            phase: None,
            payload: None,
            gate_required: None,
            on_error: OnError::default(),
        }
    }

    /// Mark whether this node's completion passes through the gate engine.
    pub fn with_gate(mut self, required: bool) -> Self {
        self.gate_required = Some(required);
        self
    }

    /// Set the failure policy.
    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Set the runner payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
    /// For decision-node outgoing edges: matched against the decision's
    /// output. Absent means the edge is always chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn when(from: impl Into<String>, to: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition.into()),
        }
    }

    /// Whether this edge is chosen given a decision output.
    ///
    /// Strings compare unquoted; any other JSON value compares via its
    /// compact JSON text. An absent condition always matches.
    pub fn matches_output(&self, output: &Value) -> bool {
        match &self.condition {
            None => true,
            Some(condition) => match output {
                Value::String(s) => s == condition,
                other => other.to_string() == *condition,
            },
        }
    }
}

/// Graph-wide defaults applied where nodes leave fields unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphDefaults {
    /// Default gate requirement for task nodes.
    pub gate_required: bool,
}

/// Graph validation errors. These are programmer errors: callers get
/// them thrown from `execute` before any node runs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("unknown entry node: {0}")]
    UnknownEntry(String),
    #[error("edge references unknown node: {from} -> {to}")]
    DanglingEdge { from: String, to: String },
    #[error("cycle detected involving node: {0}")]
    Cycle(String),
}

/// A workflow definition: entry node, nodes, and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub entry: String,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub defaults: GraphDefaults,
}

impl WorkflowGraph {
    pub fn new(entry: impl Into<String>, nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Self {
        Self {
            entry: entry.into(),
            nodes,
            edges,
            defaults: GraphDefaults::default(),
        }
    }

    /// Set graph-wide defaults.
    pub fn with_defaults(mut self, defaults: GraphDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Parse a workflow definition from YAML.
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Effective gate requirement for a node: per-node override, else
    /// the graph default. Only task nodes are gated.
    pub fn gate_required_for(&self, node: &WorkflowNode) -> bool {
        node.kind == NodeKind::Task
            && node.gate_required.unwrap_or(self.defaults.gate_required)
    }

    /// Forward adjacency: node id to outgoing edges, in declaration order.
    pub fn forward_adjacency(&self) -> HashMap<&str, Vec<&WorkflowEdge>> {
        let mut adjacency: HashMap<&str, Vec<&WorkflowEdge>> = HashMap::new();
        for node in &self.nodes {
            adjacency.entry(node.id.as_str()).or_default();
        }
        for edge in &self.edges {
            adjacency.entry(edge.from.as_str()).or_default().push(edge);
        }
        adjacency
    }

    /// Reverse adjacency: node id to predecessor node ids.
    pub fn reverse_adjacency(&self) -> HashMap<&str, Vec<&str>> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &self.nodes {
            adjacency.entry(node.id.as_str()).or_default();
        }
        for edge in &self.edges {
            adjacency
                .entry(edge.to.as_str())
                .or_default()
                .push(edge.from.as_str());
        }
        adjacency
    }

    /// In-degree per node.
    pub fn in_degrees(&self) -> HashMap<&str, usize> {
        let mut degrees: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            degrees.insert(node.id.as_str(), 0);
        }
        for edge in &self.edges {
            if let Some(degree) = degrees.get_mut(edge.to.as_str()) {
                *degree += 1;
            }
        }
        degrees
    }

    /// Validate entry, edge endpoints, and acyclicity.
    pub fn validate(&self) -> Result<(), GraphError> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        if !ids.contains(self.entry.as_str()) {
            return Err(GraphError::UnknownEntry(self.entry.clone()));
        }

        for edge in &self.edges {
            if !ids.contains(edge.from.as_str()) || !ids.contains(edge.to.as_str()) {
                return Err(GraphError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
        }

        let adjacency = self.forward_adjacency();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut rec_stack: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            Self::cycle_dfs(node.id.as_str(), &adjacency, &mut visited, &mut rec_stack)?;
        }

        Ok(())
    }

    fn cycle_dfs<'a>(
        node_id: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a WorkflowEdge>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> Result<(), GraphError> {
        if rec_stack.contains(node_id) {
            return Err(GraphError::Cycle(node_id.to_string()));
        }
        if visited.contains(node_id) {
            return Ok(());
        }

        visited.insert(node_id);
        rec_stack.insert(node_id);

        if let Some(edges) = adjacency.get(node_id) {
            for edge in edges {
                Self::cycle_dfs(edge.to.as_str(), adjacency, visited, rec_stack)?;
            }
        }

        rec_stack.remove(node_id);
        Ok(())
    }
}
