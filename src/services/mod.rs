//! Core services: event bus, completion gates, workflow service, and
//! the DAG workflow executor.

pub mod event_bus;
pub mod executor;
pub mod gates;
pub mod workflow_service;

pub use event_bus::{global_bus, EventBus, EventBusConfig, HistoryQuery, TimeoutError};
pub use executor::{
    ExecuteOptions, ExecutorConfig, NodeResult, NodeState, WorkflowExecutionSummary,
    WorkflowExecutor, WorkflowStatus,
};
pub use gates::CompletionGates;
pub use workflow_service::{
    CompletionOutcome, CompletionStatus, ServiceStatus, StatusCounts, WorkflowConfig,
    WorkflowService,
};
