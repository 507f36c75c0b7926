//! DAG workflow executor.
//!
//! Topologically executes a workflow graph with a bounded concurrency
//! limit. The scheduling loop runs on one logical task: node runners
//! are spawned and awaited through a [`JoinSet`], and every map and
//! queue mutation happens between those suspension points. Decision
//! nodes execute inline (they are synchronous and never consume a
//! concurrency slot).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::models::{
    EventType, EvidenceState, ExecutionContext, GateContext, GateEvaluationResult, GraphError,
    NodeKind, ToolCall, WorkflowEdge, WorkflowEvent, WorkflowGraph, WorkflowNode,
};
use crate::domain::ports::{StateManager, TaskRunner};
use crate::services::event_bus::EventBus;
use crate::services::gates::CompletionGates;

/// Source label stamped on events emitted by the executor.
const SOURCE: &str = "workflow-executor";

/// Configuration for the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Maximum number of simultaneously running nodes.
    pub concurrency_limit: usize,
    /// Skip gate evaluation even where required (audited per node).
    pub bypass_gates: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 1,
            bypass_gates: false,
        }
    }
}

/// Per-run overrides for [`ExecutorConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    pub concurrency_limit: Option<usize>,
    pub bypass_gates: Option<bool>,
}

/// Execution state of one node within a single `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Done,
    Blocked,
    Skipped,
    Failed,
}

/// Result recorded for a settled node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub status: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_result: Option<GateEvaluationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_tool_calls: Vec<ToolCall>,
}

/// Mutable per-node bookkeeping, owned by the scheduling loop.
#[derive(Debug, Clone)]
struct NodeExecutionState {
    state: NodeState,
    result: Option<NodeResult>,
}

impl NodeExecutionState {
    fn pending() -> Self {
        Self {
            state: NodeState::Pending,
            result: None,
        }
    }
}

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Blocked,
    Failed,
}

/// Summary returned by `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionSummary {
    pub status: WorkflowStatus,
    pub completed_nodes: Vec<String>,
    pub blocked_nodes: Vec<String>,
    pub skipped_nodes: Vec<String>,
    pub failed_nodes: Vec<String>,
    pub node_results: HashMap<String, NodeResult>,
    pub duration_ms: u64,
    /// Final execution context, including per-node outputs.
    pub context: ExecutionContext,
}

/// What a spawned node reported back to the scheduler.
enum NodeOutcome {
    Done {
        output: Option<Value>,
        gate: Option<GateEvaluationResult>,
        bypassed_gate: bool,
    },
    Blocked {
        gate: GateEvaluationResult,
    },
    Failed {
        error: String,
    },
}

/// Executes workflow graphs against an injected task runner.
pub struct WorkflowExecutor {
    runner: Arc<dyn TaskRunner>,
    gates: Arc<CompletionGates>,
    state_manager: Option<Arc<dyn StateManager>>,
    bus: Arc<EventBus>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        gates: Arc<CompletionGates>,
        bus: Arc<EventBus>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            runner,
            gates,
            state_manager: None,
            bus,
            config,
        }
    }

    /// Wire the evidence provider consulted by per-node gates.
    pub fn with_state_manager(mut self, state_manager: Arc<dyn StateManager>) -> Self {
        self.state_manager = Some(state_manager);
        self
    }

    /// Validate and execute `graph`.
    ///
    /// Validation failures (unknown entry, dangling edge, cycle) are
    /// returned before any node runs and before any event is emitted.
    pub async fn execute(
        &self,
        graph: &WorkflowGraph,
        context: Option<ExecutionContext>,
        options: ExecuteOptions,
    ) -> Result<WorkflowExecutionSummary, GraphError> {
        graph.validate()?;

        let started = Instant::now();
        let bypass_gates = options.bypass_gates.unwrap_or(self.config.bypass_gates);
        let limit = options
            .concurrency_limit
            .unwrap_or(self.config.concurrency_limit)
            .max(1);

        let forward = graph.forward_adjacency();
        let reverse = graph.reverse_adjacency();
        let mut in_degree = graph.in_degrees();

        let mut states: HashMap<&str, NodeExecutionState> = graph
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), NodeExecutionState::pending()))
            .collect();

        let mut ready: VecDeque<&str> = graph
            .nodes
            .iter()
            .filter(|n| in_degree.get(n.id.as_str()) == Some(&0))
            .map(|n| n.id.as_str())
            .collect();

        let mut context = context.unwrap_or_default();
        if !context.contains_key("results") {
            context.insert("results".to_string(), json!({}));
        }

        let mut running: JoinSet<(String, NodeOutcome)> = JoinSet::new();

        while !ready.is_empty() || !running.is_empty() {
            while running.len() < limit {
                let Some(id) = ready.pop_front() else { break };
                if states.get(id).map_or(true, |s| s.state != NodeState::Pending) {
                    continue;
                }
                let Some(node) = graph.node(id) else { continue };

                if let Some(state) = states.get_mut(id) {
                    state.state = NodeState::Running;
                }
                self.emit_node(EventType::NodeStarted, node, json!({}));

                if node.kind == NodeKind::Decision {
                    // Decisions are synchronous and free: resolve inline.
                    self.complete_decision(
                        node, graph, &forward, &reverse, &mut in_degree, &mut states,
                        &mut ready, &mut context,
                    );
                    continue;
                }

                self.spawn_node(node, graph, bypass_gates, &context, &mut running);
            }

            match running.join_next().await {
                Some(Ok((id, outcome))) => {
                    self.handle_outcome(
                        &id, outcome, graph, &forward, &reverse, &mut in_degree, &mut states,
                        &mut ready, &mut context,
                    );
                }
                Some(Err(join_error)) => {
                    warn!(%join_error, "node task aborted unexpectedly");
                }
                None => {
                    if ready.is_empty() {
                        break;
                    }
                }
            }
        }

        let summary = self.build_summary(graph, states, context, started);
        self.bus.emit(
            WorkflowEvent::new(
                EventType::WorkflowCompleted,
                json!({
                    "status": summary.status,
                    "completed": summary.completed_nodes.len(),
                    "blocked": summary.blocked_nodes.len(),
                    "skipped": summary.skipped_nodes.len(),
                    "failed": summary.failed_nodes.len(),
                    "durationMs": summary.duration_ms,
                }),
            )
            .with_source(SOURCE),
        );
        Ok(summary)
    }

    /// Spawn one task/join node onto the join set with a context
    /// snapshot. Gate evaluation happens inside the spawned task so the
    /// scheduler only suspends while awaiting completions.
    fn spawn_node(
        &self,
        node: &WorkflowNode,
        graph: &WorkflowGraph,
        bypass_gates: bool,
        context: &ExecutionContext,
        running: &mut JoinSet<(String, NodeOutcome)>,
    ) {
        let runner = Arc::clone(&self.runner);
        let gates = Arc::clone(&self.gates);
        let state_manager = self.state_manager.clone();
        let gate_required = graph.gate_required_for(node);
        let node = node.clone();
        let snapshot = context.clone();

        running.spawn(async move {
            let run = runner.run(&node, &snapshot).await;

            let outcome = if node.kind == NodeKind::Join {
                // Joins run the runner for observability only.
                if let Some(error) = run.error {
                    debug!(node_id = %node.id, %error, "join runner reported an error; ignoring");
                }
                NodeOutcome::Done {
                    output: run.output,
                    gate: None,
                    bypassed_gate: false,
                }
            } else if let Some(error) = run.error {
                NodeOutcome::Failed { error }
            } else if gate_required && !bypass_gates {
                let evidence = match &state_manager {
                    Some(state_manager) => state_manager.evidence_state().await,
                    None => EvidenceState::default(),
                };
                let gate_context = GateContext::new(node.id.clone())
                    .with_name(node.label.clone().unwrap_or_else(|| node.id.clone()));
                let gate = gates.evaluate(&evidence, &gate_context);
                if gate.is_passed() {
                    NodeOutcome::Done {
                        output: run.output,
                        gate: Some(gate),
                        bypassed_gate: false,
                    }
                } else {
                    NodeOutcome::Blocked { gate }
                }
            } else {
                NodeOutcome::Done {
                    output: run.output,
                    gate: None,
                    bypassed_gate: gate_required && bypass_gates,
                }
            };

            (node.id.clone(), outcome)
        });
    }

    /// Apply a settled node's outcome to the shared maps and release or
    /// hold its successors.
    #[allow(clippy::too_many_arguments, reason = "scheduler state is deliberately unshared")]
    fn handle_outcome<'g>(
        &self,
        id: &str,
        outcome: NodeOutcome,
        graph: &'g WorkflowGraph,
        forward: &HashMap<&'g str, Vec<&'g WorkflowEdge>>,
        reverse: &HashMap<&'g str, Vec<&'g str>>,
        in_degree: &mut HashMap<&'g str, usize>,
        states: &mut HashMap<&'g str, NodeExecutionState>,
        ready: &mut VecDeque<&'g str>,
        context: &mut ExecutionContext,
    ) {
        let Some(node) = graph.node(id) else { return };

        match outcome {
            NodeOutcome::Done {
                output,
                gate,
                bypassed_gate,
            } => {
                if bypassed_gate {
                    self.emit_node(EventType::NodeBypassGates, node, json!({}));
                }
                record_output(context, id, output.as_ref());
                set_state(
                    states,
                    id,
                    NodeState::Done,
                    NodeResult {
                        status: NodeState::Done,
                        output,
                        gate_result: gate,
                        reason: None,
                        next_tool_calls: Vec::new(),
                    },
                );
                self.emit_node(EventType::NodeCompleted, node, json!({}));
                for edge in forward.get(id).into_iter().flatten() {
                    self.settle_edge(
                        edge.to.as_str(), false, None, forward, reverse, in_degree, states, ready,
                    );
                }
            }
            NodeOutcome::Blocked { gate } => {
                self.emit_node(
                    EventType::NodeGated,
                    node,
                    json!({
                        "gateStatus": gate.status,
                        "missingEvidence": gate.missing_evidence,
                        "nextToolCalls": gate.next_tool_calls,
                    }),
                );
                let next_tool_calls = gate.next_tool_calls.clone();
                set_state(
                    states,
                    id,
                    NodeState::Blocked,
                    NodeResult {
                        status: NodeState::Blocked,
                        output: None,
                        gate_result: Some(gate),
                        reason: Some("completion gate not passed".to_string()),
                        next_tool_calls,
                    },
                );
                // Blocked is non-advancing: successors stay unreleased.
            }
            NodeOutcome::Failed { error } => {
                self.emit_node(EventType::NodeFailed, node, json!({ "error": error }));
                set_state(
                    states,
                    id,
                    NodeState::Failed,
                    NodeResult {
                        status: NodeState::Failed,
                        output: None,
                        gate_result: None,
                        reason: Some(error),
                        next_tool_calls: Vec::new(),
                    },
                );
                if node.on_error.releases_successors() {
                    for edge in forward.get(id).into_iter().flatten() {
                        self.settle_edge(
                            edge.to.as_str(), false, None, forward, reverse, in_degree, states,
                            ready,
                        );
                    }
                }
            }
        }
    }

    /// Resolve a decision node inline: derive its output, record it,
    /// then release chosen edges and prune unchosen ones.
    #[allow(clippy::too_many_arguments, reason = "scheduler state is deliberately unshared")]
    fn complete_decision<'g>(
        &self,
        node: &'g WorkflowNode,
        graph: &'g WorkflowGraph,
        forward: &HashMap<&'g str, Vec<&'g WorkflowEdge>>,
        reverse: &HashMap<&'g str, Vec<&'g str>>,
        in_degree: &mut HashMap<&'g str, usize>,
        states: &mut HashMap<&'g str, NodeExecutionState>,
        ready: &mut VecDeque<&'g str>,
        context: &mut ExecutionContext,
    ) {
        let output = decision_output(node);
        record_output(context, &node.id, Some(&output));
        set_state(
            states,
            &node.id,
            NodeState::Done,
            NodeResult {
                status: NodeState::Done,
                output: Some(output.clone()),
                gate_result: None,
                reason: None,
                next_tool_calls: Vec::new(),
            },
        );
        self.emit_node(EventType::NodeCompleted, node, json!({ "output": output }));

        let (chosen, unchosen): (Vec<&WorkflowEdge>, Vec<&WorkflowEdge>) = forward
            .get(node.id.as_str())
            .into_iter()
            .flatten()
            .copied()
            .partition(|edge| edge.matches_output(&output));

        for edge in chosen {
            self.settle_edge(
                edge.to.as_str(), false, None, forward, reverse, in_degree, states, ready,
            );
        }
        for edge in unchosen {
            self.settle_edge(
                edge.to.as_str(),
                true,
                Some(node.id.as_str()),
                forward,
                reverse,
                in_degree,
                states,
                ready,
            );
        }
    }

    /// Settle one resolved edge into `target`: decrement its in-degree,
    /// then either prune it (unchosen path, exclusively reachable) or
    /// schedule it once every predecessor has settled.
    ///
    /// A target is *exclusive* to an unchosen path iff every incoming
    /// edge originates from the pruning decision or an already-skipped
    /// node; only then is skipping safe. Skipped nodes settle their own
    /// outgoing edges so downstream joins stay schedulable.
    #[allow(clippy::too_many_arguments, reason = "scheduler state is deliberately unshared")]
    fn settle_edge<'g>(
        &self,
        target: &'g str,
        allow_skip: bool,
        decision_id: Option<&str>,
        forward: &HashMap<&'g str, Vec<&'g WorkflowEdge>>,
        reverse: &HashMap<&'g str, Vec<&'g str>>,
        in_degree: &mut HashMap<&'g str, usize>,
        states: &mut HashMap<&'g str, NodeExecutionState>,
        ready: &mut VecDeque<&'g str>,
    ) {
        if let Some(degree) = in_degree.get_mut(target) {
            *degree = degree.saturating_sub(1);
        }

        let target_pending = states
            .get(target)
            .map_or(false, |s| s.state == NodeState::Pending);
        if !target_pending {
            return;
        }

        if allow_skip && is_exclusive(target, decision_id, reverse, states) {
            set_state(
                states,
                target,
                NodeState::Skipped,
                NodeResult {
                    status: NodeState::Skipped,
                    output: None,
                    gate_result: None,
                    reason: Some("unchosen decision branch".to_string()),
                    next_tool_calls: Vec::new(),
                },
            );
            self.bus.emit(
                WorkflowEvent::new(EventType::NodeSkipped, json!({ "nodeId": target }))
                    .with_source(SOURCE),
            );
            for edge in forward.get(target).into_iter().flatten() {
                self.settle_edge(
                    edge.to.as_str(),
                    true,
                    decision_id,
                    forward,
                    reverse,
                    in_degree,
                    states,
                    ready,
                );
            }
            return;
        }

        if in_degree.get(target) == Some(&0) {
            ready.push_back(target);
        }
    }

    fn build_summary(
        &self,
        graph: &WorkflowGraph,
        states: HashMap<&str, NodeExecutionState>,
        context: ExecutionContext,
        started: Instant,
    ) -> WorkflowExecutionSummary {
        let mut completed_nodes = Vec::new();
        let mut blocked_nodes = Vec::new();
        let mut skipped_nodes = Vec::new();
        let mut failed_nodes = Vec::new();
        let mut node_results = HashMap::new();

        for node in &graph.nodes {
            let Some(state) = states.get(node.id.as_str()) else { continue };
            match state.state {
                NodeState::Done => completed_nodes.push(node.id.clone()),
                NodeState::Blocked => blocked_nodes.push(node.id.clone()),
                NodeState::Skipped => skipped_nodes.push(node.id.clone()),
                NodeState::Failed => failed_nodes.push(node.id.clone()),
                NodeState::Pending | NodeState::Running => {}
            }
            if let Some(result) = &state.result {
                node_results.insert(node.id.clone(), result.clone());
            }
        }

        let status = if !blocked_nodes.is_empty() {
            WorkflowStatus::Blocked
        } else if !failed_nodes.is_empty() {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };

        WorkflowExecutionSummary {
            status,
            completed_nodes,
            blocked_nodes,
            skipped_nodes,
            failed_nodes,
            node_results,
            duration_ms: started.elapsed().as_millis() as u64,
            context,
        }
    }

    fn emit_node(&self, event_type: EventType, node: &WorkflowNode, mut data: Value) {
        if let Value::Object(ref mut map) = data {
            map.insert("nodeId".to_string(), json!(node.id));
            map.insert("kind".to_string(), json!(node.kind));
            if let Some(label) = &node.label {
                map.insert("label".to_string(), json!(label));
            }
        }
        self.bus
            .emit(WorkflowEvent::new(event_type, data).with_source(SOURCE));
    }
}

/// A decision's output: the `output` field of its payload when present,
/// otherwise the whole payload.
fn decision_output(node: &WorkflowNode) -> Value {
    node.payload
        .as_ref()
        .map(|payload| {
            payload
                .get("output")
                .cloned()
                .unwrap_or_else(|| payload.clone())
        })
        .unwrap_or(Value::Null)
}

fn record_output(context: &mut ExecutionContext, id: &str, output: Option<&Value>) {
    let Some(value) = output else { return };
    context.insert(format!("node_{id}"), value.clone());
    if let Some(Value::Object(results)) = context.get_mut("results") {
        results.insert(id.to_string(), value.clone());
    }
}

fn set_state(
    states: &mut HashMap<&str, NodeExecutionState>,
    id: &str,
    state: NodeState,
    result: NodeResult,
) {
    if let Some(entry) = states.get_mut(id) {
        entry.state = state;
        entry.result = Some(result);
    }
}

fn is_exclusive(
    target: &str,
    decision_id: Option<&str>,
    reverse: &HashMap<&str, Vec<&str>>,
    states: &HashMap<&str, NodeExecutionState>,
) -> bool {
    let Some(predecessors) = reverse.get(target) else {
        return false;
    };
    predecessors.iter().all(|pred| {
        Some(*pred) == decision_id
            || states
                .get(pred)
                .map_or(false, |s| s.state == NodeState::Skipped)
    })
}
