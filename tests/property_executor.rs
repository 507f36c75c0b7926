//! Property test: serial execution of any forward-edged DAG is a
//! topological order covering every node.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::RecordingRunner;
use proptest::prelude::*;

use taskgate::{
    CompletionGates, EventBus, ExecuteOptions, ExecutorConfig, WorkflowEdge, WorkflowExecutor,
    WorkflowGraph, WorkflowNode, WorkflowStatus,
};

const NODE_COUNT: usize = 6;

/// One flag per (i, j) pair with i < j; forward-only edges keep the
/// graph acyclic by construction.
fn edge_flags() -> impl Strategy<Value = Vec<bool>> {
    let pairs = NODE_COUNT * (NODE_COUNT - 1) / 2;
    proptest::collection::vec(any::<bool>(), pairs)
}

fn build_graph(flags: &[bool]) -> WorkflowGraph {
    let nodes: Vec<WorkflowNode> = (0..NODE_COUNT)
        .map(|i| WorkflowNode::task(format!("n{i}")))
        .collect();

    let mut edges = Vec::new();
    let mut flag_index = 0;
    for i in 0..NODE_COUNT {
        for j in (i + 1)..NODE_COUNT {
            if flags[flag_index] {
                edges.push(WorkflowEdge::new(format!("n{i}"), format!("n{j}")));
            }
            flag_index += 1;
        }
    }

    WorkflowGraph::new("n0", nodes, edges)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn serial_execution_is_a_topological_order(flags in edge_flags()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let graph = build_graph(&flags);
        let runner = Arc::new(RecordingRunner::new(Duration::ZERO));
        let executor = WorkflowExecutor::new(
            Arc::clone(&runner) as Arc<dyn taskgate::TaskRunner>,
            Arc::new(CompletionGates::default()),
            Arc::new(EventBus::default()),
            ExecutorConfig::default(),
        );

        let summary = runtime
            .block_on(executor.execute(&graph, None, ExecuteOptions::default()))
            .unwrap();

        prop_assert_eq!(summary.status, WorkflowStatus::Completed);
        prop_assert_eq!(summary.completed_nodes.len(), NODE_COUNT);

        let order = runner.run_order();
        prop_assert_eq!(order.len(), NODE_COUNT);
        for edge in &graph.edges {
            let from = order.iter().position(|id| id == &edge.from).unwrap();
            let to = order.iter().position(|id| id == &edge.to).unwrap();
            prop_assert!(from < to, "edge {} -> {} violated", edge.from, edge.to);
        }
    }
}
