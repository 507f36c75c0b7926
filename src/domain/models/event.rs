//! Event domain model.
//!
//! Events are immutable records flowing through the in-process event bus.
//! The type set is closed; the `*` wildcard is reserved for subscriptions
//! and is never carried by an emitted event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of event types recognized by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Runtime session started.
    #[serde(rename = "lifecycle:startup")]
    LifecycleStartup,
    /// Runtime session shutting down.
    #[serde(rename = "lifecycle:shutdown")]
    LifecycleShutdown,

    /// A task was created.
    #[serde(rename = "task:create")]
    TaskCreate,
    /// A task was promoted to in-progress.
    #[serde(rename = "task:start")]
    TaskStart,
    /// A task's progress value changed.
    #[serde(rename = "task:progress")]
    TaskProgress,
    /// A task completed.
    #[serde(rename = "task:complete")]
    TaskComplete,
    /// A task failed.
    #[serde(rename = "task:fail")]
    TaskFail,

    /// A guard validation run finished.
    #[serde(rename = "guard:validated")]
    GuardValidated,
    /// A test run finished.
    #[serde(rename = "test:run")]
    TestRun,

    /// A completion gate evaluated to passed.
    #[serde(rename = "workflow:gate_passed")]
    GatePassed,
    /// A completion gate is waiting on missing or stale evidence.
    #[serde(rename = "workflow:gate_pending")]
    GatePending,
    /// A completion gate blocked completion.
    #[serde(rename = "workflow:gate_blocked")]
    GateBlocked,

    /// A workflow node began executing.
    #[serde(rename = "taskgraph:node:started")]
    NodeStarted,
    /// A workflow node finished successfully.
    #[serde(rename = "taskgraph:node:completed")]
    NodeCompleted,
    /// A workflow node was held back by its completion gate.
    #[serde(rename = "taskgraph:node:gated")]
    NodeGated,
    /// A workflow node was pruned off an unchosen decision branch.
    #[serde(rename = "taskgraph:node:skipped")]
    NodeSkipped,
    /// A workflow node's runner reported an error.
    #[serde(rename = "taskgraph:node:failed")]
    NodeFailed,
    /// A required gate was bypassed for a node (audit record).
    #[serde(rename = "taskgraph:node:bypass_gates")]
    NodeBypassGates,
    /// A workflow run finished.
    #[serde(rename = "taskgraph:workflow:completed")]
    WorkflowCompleted,

    /// Matches every emitted event. Subscription-only; emitting an event
    /// with this type is a programmer error and is dropped with a warning.
    #[serde(rename = "*")]
    Wildcard,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LifecycleStartup => "lifecycle:startup",
            Self::LifecycleShutdown => "lifecycle:shutdown",
            Self::TaskCreate => "task:create",
            Self::TaskStart => "task:start",
            Self::TaskProgress => "task:progress",
            Self::TaskComplete => "task:complete",
            Self::TaskFail => "task:fail",
            Self::GuardValidated => "guard:validated",
            Self::TestRun => "test:run",
            Self::GatePassed => "workflow:gate_passed",
            Self::GatePending => "workflow:gate_pending",
            Self::GateBlocked => "workflow:gate_blocked",
            Self::NodeStarted => "taskgraph:node:started",
            Self::NodeCompleted => "taskgraph:node:completed",
            Self::NodeGated => "taskgraph:node:gated",
            Self::NodeSkipped => "taskgraph:node:skipped",
            Self::NodeFailed => "taskgraph:node:failed",
            Self::NodeBypassGates => "taskgraph:node:bypass_gates",
            Self::WorkflowCompleted => "taskgraph:workflow:completed",
            Self::Wildcard => "*",
        }
    }

    /// Whether this type may be carried by an emitted event.
    pub fn is_emittable(&self) -> bool {
        !matches!(self, Self::Wildcard)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique identifier for a bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable event record.
///
/// `data` is metadata-only by convention: no file contents, no detail
/// arrays longer than ten entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl WorkflowEvent {
    /// Build an event stamped at the current instant.
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
            source: None,
        }
    }

    /// Attach the emitting component's name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
