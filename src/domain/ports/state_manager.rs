//! State manager port.

use async_trait::async_trait;

use crate::domain::models::{EvidenceState, GuardEvidence, TestEvidence, WorkflowEvent};

/// Collaborator owning evidence records and the observability timeline.
///
/// The core only reads evidence; the setter methods exist for external
/// writers (guard validators, test runners) and are never called from
/// inside the core.
#[async_trait]
pub trait StateManager: Send + Sync {
    /// Current evidence snapshot.
    async fn evidence_state(&self) -> EvidenceState;

    /// Record a guard run. External writers only.
    async fn set_guard_evidence(&self, evidence: GuardEvidence);

    /// Record a test run. External writers only.
    async fn set_test_evidence(&self, evidence: TestEvidence);

    /// Append one event to the timeline, preserving call order.
    async fn append_timeline(&self, event: WorkflowEvent);

    /// The timeline recorded so far, oldest first.
    async fn timeline(&self) -> Vec<WorkflowEvent>;
}
