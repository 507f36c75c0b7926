//! Domain models.

pub mod event;
pub mod evidence;
pub mod gate;
pub mod graph;
pub mod task;

pub use event::{EventType, SubscriptionId, WorkflowEvent};
pub use evidence::{EvidenceKind, EvidenceState, EvidenceStatus, GuardEvidence, TestEvidence};
pub use gate::{
    FailingEvidence, GateContext, GateEvaluationResult, GatePolicy, GatePolicyPatch, GateStatus,
    ToolCall,
};
pub use graph::{
    ExecutionContext, GraphDefaults, GraphError, NodeKind, OnError, WorkflowEdge, WorkflowGraph,
    WorkflowNode,
};
pub use task::{
    CreateTaskParams, NoteType, Task, TaskFilter, TaskId, TaskNote, TaskPatch, TaskPriority,
    TaskStatus,
};
