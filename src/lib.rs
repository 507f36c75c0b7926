//! Taskgate - task and workflow execution engine with completion gates
//!
//! The core of a project-scoped coding-assistant runtime:
//! - DAG workflow executor with bounded concurrency and decision-branch pruning
//! - Evidence-based completion gates producing remediation tool calls
//! - Persistent task store with gate-enforced completion and startup resume
//! - Typed, wildcard-capable in-process event bus with bounded history
//!
//! External collaborators (task runners, evidence providers, tool
//! drivers) plug in through the narrow ports in [`domain::ports`].

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use adapters::fs_store::{FsTaskStore, MemoryTaskStore};
pub use domain::models::{
    CreateTaskParams, EventType, EvidenceKind, EvidenceState, EvidenceStatus, GateContext,
    GateEvaluationResult, GatePolicy, GatePolicyPatch, GateStatus, GuardEvidence, Task, TaskFilter,
    TaskId, TaskPatch, TaskPriority, TaskStatus, TestEvidence, WorkflowEdge, WorkflowEvent,
    WorkflowGraph, WorkflowNode,
};
pub use domain::ports::{RunnerOutput, StateManager, TaskRunner, TaskStore};
pub use infrastructure::config::{ConfigLoader, TaskgateConfig};
pub use services::event_bus::{global_bus, EventBus, EventBusConfig, HistoryQuery, TimeoutError};
pub use services::executor::{
    ExecuteOptions, ExecutorConfig, WorkflowExecutionSummary, WorkflowExecutor, WorkflowStatus,
};
pub use services::gates::CompletionGates;
pub use services::workflow_service::{
    CompletionOutcome, CompletionStatus, WorkflowConfig, WorkflowService,
};
