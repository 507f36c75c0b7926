//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use taskgate::domain::models::{
    EvidenceState, ExecutionContext, GuardEvidence, TestEvidence, WorkflowEvent, WorkflowNode,
};
use taskgate::{RunnerOutput, StateManager, TaskRunner};

/// Evidence and timeline holder backed by in-process locks.
#[derive(Default)]
pub struct InMemoryStateManager {
    evidence: RwLock<EvidenceState>,
    timeline: RwLock<Vec<WorkflowEvent>>,
}

#[async_trait]
impl StateManager for InMemoryStateManager {
    async fn evidence_state(&self) -> EvidenceState {
        self.evidence.read().await.clone()
    }

    async fn set_guard_evidence(&self, evidence: GuardEvidence) {
        self.evidence.write().await.last_guard_run = Some(evidence);
    }

    async fn set_test_evidence(&self, evidence: TestEvidence) {
        self.evidence.write().await.last_test_run = Some(evidence);
    }

    async fn append_timeline(&self, event: WorkflowEvent) {
        self.timeline.write().await.push(event);
    }

    async fn timeline(&self) -> Vec<WorkflowEvent> {
        self.timeline.read().await.clone()
    }
}

/// Runner that records execution order and peak concurrency.
pub struct RecordingRunner {
    delay: std::time::Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Highest number of simultaneously running nodes observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Node ids in the order their runs began.
    pub fn run_order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run(&self, node: &WorkflowNode, _context: &ExecutionContext) -> RunnerOutput {
        self.order.lock().unwrap().push(node.id.clone());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        RunnerOutput::ok(json!({ "ran": node.id }))
    }
}
