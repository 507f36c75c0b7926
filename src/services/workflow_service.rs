//! Workflow service: persistent task life cycle with gate-enforced
//! completion.
//!
//! Owns every task record. At most one task is in progress at a time;
//! completion runs through the gate engine unless gates are disabled or
//! no state manager is wired.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::models::{
    CreateTaskParams, EventType, GateContext, GateEvaluationResult, GatePolicyPatch, GateStatus,
    NoteType, Task, TaskFilter, TaskId, TaskNote, TaskPatch, TaskStatus, WorkflowEvent,
};
use crate::domain::ports::{StateManager, TaskStore};
use crate::services::event_bus::EventBus;
use crate::services::gates::CompletionGates;

/// Source label stamped on events emitted by this service.
const SOURCE: &str = "workflow-service";

/// Configuration for the workflow service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Master switch; a disabled service still answers reads.
    pub enabled: bool,
    /// Run retention cleanup during `initialize`.
    pub auto_cleanup_enabled: bool,
    /// Completed tasks older than this many days are cleaned up.
    pub completed_retention_days: u32,
    /// At most this many completed tasks are retained.
    pub max_completed_tasks: usize,
    /// Whether completion runs through the gate engine.
    pub gates_enabled: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_cleanup_enabled: true,
            completed_retention_days: 7,
            max_completed_tasks: 100,
            gates_enabled: true,
        }
    }
}

/// Caller-visible outcome category of a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Pending,
    Blocked,
}

/// Result of `complete_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    /// Present when gates were consulted; carries `next_tool_calls`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateEvaluationResult>,
    pub message: String,
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub paused: usize,
    pub blocked: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Paused => self.paused += 1,
            TaskStatus::Blocked => self.blocked += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub enabled: bool,
    pub gates_enabled: bool,
    pub total_tasks: usize,
    pub counts: StatusCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
}

/// Persistent task store with gate-enforced completion.
pub struct WorkflowService {
    tasks: RwLock<HashMap<TaskId, Task>>,
    current: RwLock<Option<TaskId>>,
    config: RwLock<WorkflowConfig>,
    gates: Arc<CompletionGates>,
    store: Arc<dyn TaskStore>,
    state_manager: Option<Arc<dyn StateManager>>,
    bus: Arc<EventBus>,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gates: Arc<CompletionGates>,
        bus: Arc<EventBus>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            config: RwLock::new(config),
            gates,
            store,
            state_manager: None,
            bus,
        }
    }

    /// Wire the evidence/timeline collaborator. Without one, completion
    /// skips gate evaluation entirely.
    pub fn with_state_manager(mut self, state_manager: Arc<dyn StateManager>) -> Self {
        self.state_manager = Some(state_manager);
        self
    }

    /// Load persisted tasks and restore the current-task pointer.
    ///
    /// If several tasks were left in progress, the most recently updated
    /// one wins and the rest are demoted to paused.
    pub async fn initialize(&self) {
        let loaded = match self.store.load_all().await {
            Ok(tasks) => tasks,
            Err(error) => {
                warn!(%error, "task store unreadable; starting empty");
                Vec::new()
            }
        };

        {
            let mut tasks = self.tasks.write().await;
            for task in loaded {
                tasks.insert(task.id, task);
            }

            let mut in_progress: Vec<TaskId> = tasks
                .values()
                .filter(|t| t.status == TaskStatus::InProgress)
                .map(|t| t.id)
                .collect();
            in_progress.sort_by_key(|id| tasks[id].updated_at);

            let elected = in_progress.pop();
            for id in in_progress {
                if let Some(task) = tasks.get_mut(&id) {
                    task.status = TaskStatus::Paused;
                    task.touch();
                    self.persist(task).await;
                    debug!(task_id = %id, "demoted stale in-progress task to paused");
                }
            }
            *self.current.write().await = elected;

            info!(count = tasks.len(), "workflow service initialized");
        }

        if self.config.read().await.auto_cleanup_enabled {
            let removed = self.cleanup_completed_tasks().await;
            if removed > 0 {
                info!(removed, "retention cleanup removed completed tasks");
            }
        }
    }

    /// Create a pending task. A `parent_id` referencing an unknown task
    /// is dropped so the parent/subtask invariant holds.
    pub async fn create_task(&self, mut params: CreateTaskParams) -> Task {
        let mut tasks = self.tasks.write().await;

        if let Some(parent_id) = params.parent_id {
            if !tasks.contains_key(&parent_id) {
                warn!(%parent_id, "unknown parent; creating task at the root");
                params.parent_id = None;
            }
        }

        let task = Task::from_params(params);
        if let Some(parent_id) = task.parent_id {
            if let Some(parent) = tasks.get_mut(&parent_id) {
                parent.subtasks.push(task.id);
                parent.touch();
                self.persist(parent).await;
            }
        }

        tasks.insert(task.id, task.clone());
        self.persist(&task).await;
        drop(tasks);

        self.emit(
            EventType::TaskCreate,
            json!({
                "taskId": task.id,
                "name": task.name,
                "priority": task.priority,
            }),
        );
        task
    }

    /// Promote a task to in-progress, pausing any current task first.
    pub async fn start_task(&self, id: TaskId) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&id) {
            return None;
        }

        let mut current = self.current.write().await;
        if let Some(current_id) = *current {
            if current_id != id {
                if let Some(previous) = tasks.get_mut(&current_id) {
                    if previous.status == TaskStatus::InProgress {
                        previous.status = TaskStatus::Paused;
                        previous.touch();
                        self.persist(previous).await;
                    }
                }
            }
        }

        let task = tasks.get_mut(&id)?;
        Self::reopen_markers(task);
        task.status = TaskStatus::InProgress;
        if task.started_at.is_none() {
            task.started_at = Some(Utc::now());
        }
        task.touch();
        self.persist(task).await;
        *current = Some(id);

        let snapshot = task.clone();
        drop(current);
        drop(tasks);

        self.emit(
            EventType::TaskStart,
            json!({ "taskId": snapshot.id, "name": snapshot.name }),
        );
        Some(snapshot)
    }

    /// Apply a field patch. Progress is clamped to `[0, 100]`; a value
    /// of 100 is reserved for completed tasks, so a non-completed task
    /// caps at 99. A changed progress value emits `task:progress`.
    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id)?;

        let mut progress_changed = false;
        if let Some(name) = patch.name {
            task.name = name;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(progress) = patch.progress {
            let cap = if task.status == TaskStatus::Completed { 100 } else { 99 };
            progress_changed = task.set_progress(progress.min(cap));
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }
        if let Some(actual_tokens) = patch.actual_tokens {
            task.actual_tokens = Some(actual_tokens);
        }
        task.touch();
        self.persist(task).await;

        let snapshot = task.clone();
        drop(tasks);

        if progress_changed {
            self.emit(
                EventType::TaskProgress,
                json!({ "taskId": snapshot.id, "progress": snapshot.progress }),
            );
        }
        Some(snapshot)
    }

    /// Set a task aside without finishing it.
    pub async fn pause_task(&self, id: TaskId) -> Option<Task> {
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id)?;
            Self::reopen_markers(task);
            task.status = TaskStatus::Paused;
            task.touch();
            self.persist(task).await;
            task.clone()
        };
        self.clear_current_if(id).await;
        Some(snapshot)
    }

    /// Mark a task failed.
    pub async fn fail_task(&self, id: TaskId, reason: Option<String>) -> Option<Task> {
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id)?;
            Self::reopen_markers(task);
            task.status = TaskStatus::Failed;
            if let Some(ref reason) = reason {
                task.notes.push(TaskNote::new(reason.clone(), NoteType::Blocker));
            }
            task.touch();
            self.persist(task).await;
            task.clone()
        };
        self.clear_current_if(id).await;

        self.emit(
            EventType::TaskFail,
            json!({ "taskId": id, "reason": reason }),
        );
        Some(snapshot)
    }

    /// Attempt completion through the gate engine.
    pub async fn complete_task(
        &self,
        id: TaskId,
        actual_tokens: Option<u64>,
    ) -> CompletionOutcome {
        let Some(task) = self.get_task(id).await else {
            return CompletionOutcome {
                status: CompletionStatus::Blocked,
                task: None,
                gate: None,
                message: format!("task not found: {id}"),
            };
        };

        let gates_enabled = self.config.read().await.gates_enabled;
        let Some(state_manager) = self.state_manager.as_ref().filter(|_| gates_enabled) else {
            let completed = self.finish_completion(id, actual_tokens).await;
            return CompletionOutcome {
                status: CompletionStatus::Completed,
                task: completed,
                gate: None,
                message: "completed without gate evaluation".to_string(),
            };
        };

        let evidence = state_manager.evidence_state().await;
        let context = GateContext::new(id.to_string())
            .with_name(task.name.clone())
            .with_tags(task.tags.clone());
        let gate = self.gates.evaluate(&evidence, &context);

        match gate.status {
            GateStatus::Passed => {
                let completed = self.finish_completion(id, actual_tokens).await;
                self.record_timeline(
                    EventType::GatePassed,
                    json!({
                        "taskId": id,
                        "taskName": task.name,
                        "gateStatus": gate.status,
                    }),
                )
                .await;
                CompletionOutcome {
                    status: CompletionStatus::Completed,
                    task: completed,
                    gate: Some(gate),
                    message: "all completion gates passed".to_string(),
                }
            }
            GateStatus::Pending => {
                self.record_timeline(
                    EventType::GatePending,
                    json!({
                        "taskId": id,
                        "taskName": task.name,
                        "gateStatus": gate.status,
                        "missingEvidence": gate.missing_evidence,
                    }),
                )
                .await;
                CompletionOutcome {
                    status: CompletionStatus::Pending,
                    task: Some(task),
                    gate: Some(gate),
                    message: "completion gates are waiting on evidence".to_string(),
                }
            }
            GateStatus::Blocked => {
                let blocked = {
                    let mut tasks = self.tasks.write().await;
                    tasks.get_mut(&id).map(|t| {
                        t.status = TaskStatus::Blocked;
                        t.touch();
                        t.clone()
                    })
                };
                if let Some(ref blocked) = blocked {
                    self.persist(blocked).await;
                }
                self.record_timeline(
                    EventType::GateBlocked,
                    json!({
                        "taskId": id,
                        "taskName": task.name,
                        "gateStatus": gate.status,
                        "failingEvidence": gate.failing_summary(),
                    }),
                )
                .await;
                CompletionOutcome {
                    status: CompletionStatus::Blocked,
                    task: blocked,
                    gate: Some(gate),
                    message: "completion gates blocked the task".to_string(),
                }
            }
        }
    }

    /// Complete a task without consulting gates.
    pub async fn force_complete_task(&self, id: TaskId) -> Option<Task> {
        self.finish_completion(id, None).await
    }

    async fn finish_completion(&self, id: TaskId, actual_tokens: Option<u64>) -> Option<Task> {
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(&id)?;
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.completed_at = Some(Utc::now());
            if let Some(actual_tokens) = actual_tokens {
                task.actual_tokens = Some(actual_tokens);
            }
            task.touch();
            self.persist(task).await;
            task.clone()
        };
        self.clear_current_if(id).await;

        self.emit(
            EventType::TaskComplete,
            json!({ "taskId": id, "actualTokens": actual_tokens }),
        );
        Some(snapshot)
    }

    /// Append a timestamped note.
    pub async fn add_note(
        &self,
        id: TaskId,
        content: impl Into<String>,
        note_type: NoteType,
    ) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id)?;
        task.notes.push(TaskNote::new(content, note_type));
        task.touch();
        self.persist(task).await;
        Some(task.clone())
    }

    /// Record a file touched by the task; duplicates are ignored.
    pub async fn add_affected_file(&self, id: TaskId, path: impl Into<String>) -> Option<Task> {
        let path = path.into();
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id)?;
        if !task.files_affected.contains(&path) {
            task.files_affected.push(path);
            task.touch();
            self.persist(task).await;
        }
        Some(task.clone())
    }

    /// Reference an externally written checkpoint document.
    pub async fn add_checkpoint(&self, id: TaskId, checkpoint_id: impl Into<String>) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id)?;
        task.checkpoints.push(checkpoint_id.into());
        task.touch();
        self.persist(task).await;
        Some(task.clone())
    }

    /// Delete a task. Detaches it from its parent's `subtasks` and
    /// clears `parent_id` on its children. Returns false for an unknown
    /// id.
    pub async fn delete_task(&self, id: TaskId) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(removed) = tasks.remove(&id) else {
            return false;
        };

        if let Some(parent_id) = removed.parent_id {
            if let Some(parent) = tasks.get_mut(&parent_id) {
                parent.subtasks.retain(|s| *s != id);
                parent.touch();
                self.persist(parent).await;
            }
        }
        for child_id in &removed.subtasks {
            if let Some(child) = tasks.get_mut(child_id) {
                child.parent_id = None;
                child.touch();
                self.persist(child).await;
            }
        }
        drop(tasks);

        self.clear_current_if(id).await;
        if let Err(error) = self.store.remove(id).await {
            warn!(task_id = %id, %error, "failed to remove task document");
        }
        true
    }

    /// Look up one task.
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// The at-most-one in-progress task.
    pub async fn current_task(&self) -> Option<Task> {
        let current = *self.current.read().await;
        match current {
            Some(id) => self.get_task(id).await,
            None => None,
        }
    }

    /// List tasks matching `filter`, highest priority first, most
    /// recently updated first within a priority.
    pub async fn get_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut selected: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        selected.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        selected
    }

    /// Tasks still waiting to start.
    pub async fn get_pending_tasks(&self) -> Vec<Task> {
        self.get_tasks(&TaskFilter {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        })
        .await
    }

    /// Remove every completed task. Returns how many were removed.
    pub async fn clear_completed_tasks(&self) -> usize {
        let ids: Vec<TaskId> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.id)
                .collect()
        };
        for id in &ids {
            self.delete_task(*id).await;
        }
        ids.len()
    }

    /// Remove every task.
    pub async fn clear_all_tasks(&self) {
        self.tasks.write().await.clear();
        *self.current.write().await = None;
        if let Err(error) = self.store.clear().await {
            warn!(%error, "failed to clear task store");
        }
    }

    /// Apply retention rules to completed tasks: age beyond
    /// `completed_retention_days`, then count beyond
    /// `max_completed_tasks` (oldest first). Returns how many were
    /// removed.
    pub async fn cleanup_completed_tasks(&self) -> usize {
        let (retention_days, max_completed) = {
            let config = self.config.read().await;
            (config.completed_retention_days, config.max_completed_tasks)
        };
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));

        let mut completed: Vec<(TaskId, chrono::DateTime<Utc>)> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| (t.id, t.completed_at.unwrap_or(t.updated_at)))
                .collect()
        };
        completed.sort_by_key(|(_, completed_at)| *completed_at);

        let mut expired: Vec<TaskId> = completed
            .iter()
            .filter(|(_, completed_at)| *completed_at < cutoff)
            .map(|(id, _)| *id)
            .collect();

        let surviving = completed.len() - expired.len();
        if surviving > max_completed {
            let overflow = surviving - max_completed;
            let already: std::collections::HashSet<TaskId> = expired.iter().copied().collect();
            let overflow_ids: Vec<TaskId> = completed
                .iter()
                .filter(|(id, _)| !already.contains(id))
                .take(overflow)
                .map(|(id, _)| *id)
                .collect();
            expired.extend(overflow_ids);
        }

        for id in &expired {
            self.delete_task(*id).await;
        }
        expired.len()
    }

    /// Toggle gate enforcement on completion.
    pub async fn set_gates_enabled(&self, enabled: bool) {
        self.config.write().await.gates_enabled = enabled;
    }

    /// Merge a partial gate-policy update.
    pub fn update_gate_policy(&self, patch: &GatePolicyPatch) {
        self.gates.update_config(patch);
    }

    /// Service-wide status snapshot.
    pub async fn status(&self) -> ServiceStatus {
        let tasks = self.tasks.read().await;
        let mut counts = StatusCounts::default();
        for task in tasks.values() {
            counts.bump(task.status);
        }
        let config = self.config.read().await;
        ServiceStatus {
            enabled: config.enabled,
            gates_enabled: config.gates_enabled,
            total_tasks: tasks.len(),
            counts,
            current_task_id: *self.current.read().await,
        }
    }

    async fn clear_current_if(&self, id: TaskId) {
        let mut current = self.current.write().await;
        if *current == Some(id) {
            *current = None;
        }
    }

    /// Best-effort persistence; a failed write never fails the
    /// operation.
    async fn persist(&self, task: &Task) {
        if let Err(error) = self.store.save(task).await {
            warn!(task_id = %task.id, %error, "failed to persist task");
        }
    }

    /// Leaving the completed state clears completion markers so that
    /// `progress == 100` and a set `completed_at` remain exclusive to
    /// completed tasks.
    fn reopen_markers(task: &mut Task) {
        task.completed_at = None;
        if task.progress == 100 {
            task.progress = 99;
        }
    }

    fn emit(&self, event_type: EventType, data: serde_json::Value) {
        self.bus
            .emit(WorkflowEvent::new(event_type, data).with_source(SOURCE));
    }

    /// Emit a gate event on the bus and append it to the timeline in
    /// the same order.
    async fn record_timeline(&self, event_type: EventType, data: serde_json::Value) {
        let event = WorkflowEvent::new(event_type, data).with_source(SOURCE);
        self.bus.emit(event.clone());
        if let Some(state_manager) = &self.state_manager {
            state_manager.append_timeline(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs_store::MemoryTaskStore;
    use crate::services::event_bus::HistoryQuery;

    fn service() -> WorkflowService {
        WorkflowService::new(
            Arc::new(MemoryTaskStore::default()),
            Arc::new(CompletionGates::default()),
            Arc::new(EventBus::default()),
            WorkflowConfig::default(),
        )
    }

    #[tokio::test]
    async fn at_most_one_task_in_progress() {
        let service = service();
        let a = service.create_task(CreateTaskParams::named("a")).await;
        let b = service.create_task(CreateTaskParams::named("b")).await;

        service.start_task(a.id).await.unwrap();
        service.start_task(b.id).await.unwrap();

        let a = service.get_task(a.id).await.unwrap();
        let b = service.get_task(b.id).await.unwrap();
        assert_eq!(a.status, TaskStatus::Paused);
        assert_eq!(b.status, TaskStatus::InProgress);
        assert_eq!(service.current_task().await.unwrap().id, b.id);
    }

    #[tokio::test]
    async fn completion_without_state_manager_skips_gates() {
        let service = service();
        let task = service.create_task(CreateTaskParams::named("free")).await;

        let outcome = service.complete_task(task.id, Some(1_234)).await;
        assert_eq!(outcome.status, CompletionStatus::Completed);

        let task = service.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.completed_at.is_some());
        assert_eq!(task.actual_tokens, Some(1_234));
    }

    #[tokio::test]
    async fn complete_unknown_task_is_blocked_with_message() {
        let service = service();
        let outcome = service.complete_task(TaskId::new(), None).await;
        assert_eq!(outcome.status, CompletionStatus::Blocked);
        assert!(outcome.message.contains("not found"));
        assert!(outcome.gate.is_none());
    }

    #[tokio::test]
    async fn subtask_links_are_bidirectional_and_cleaned_on_delete() {
        let service = service();
        let parent = service.create_task(CreateTaskParams::named("parent")).await;
        let child = service
            .create_task(CreateTaskParams {
                name: "child".into(),
                parent_id: Some(parent.id),
                ..Default::default()
            })
            .await;

        let parent_read = service.get_task(parent.id).await.unwrap();
        assert!(parent_read.subtasks.contains(&child.id));

        assert!(service.delete_task(child.id).await);
        let parent_read = service.get_task(parent.id).await.unwrap();
        assert!(parent_read.subtasks.is_empty());
    }

    #[tokio::test]
    async fn deleting_parent_detaches_children() {
        let service = service();
        let parent = service.create_task(CreateTaskParams::named("parent")).await;
        let child = service
            .create_task(CreateTaskParams {
                name: "child".into(),
                parent_id: Some(parent.id),
                ..Default::default()
            })
            .await;

        assert!(service.delete_task(parent.id).await);
        let child = service.get_task(child.id).await.unwrap();
        assert!(child.parent_id.is_none());
    }

    #[tokio::test]
    async fn unknown_parent_creates_root_task() {
        let service = service();
        let task = service
            .create_task(CreateTaskParams {
                name: "orphan".into(),
                parent_id: Some(TaskId::new()),
                ..Default::default()
            })
            .await;
        assert!(task.parent_id.is_none());
    }

    #[tokio::test]
    async fn update_clamps_progress_and_emits_once() {
        let bus = Arc::new(EventBus::default());
        let service = WorkflowService::new(
            Arc::new(MemoryTaskStore::default()),
            Arc::new(CompletionGates::default()),
            Arc::clone(&bus),
            WorkflowConfig::default(),
        );
        let task = service.create_task(CreateTaskParams::named("p")).await;

        // 100 is reserved for completed tasks, so the clamp lands at 99.
        let updated = service
            .update_task(
                task.id,
                TaskPatch {
                    progress: Some(250),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.progress, 99);

        // Same clamped value again: no second progress event.
        service
            .update_task(
                task.id,
                TaskPatch {
                    progress: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let progress_events = bus.history(&HistoryQuery {
            event_type: Some(EventType::TaskProgress),
            ..Default::default()
        });
        assert_eq!(progress_events.len(), 1);
    }

    #[tokio::test]
    async fn tasks_sort_by_priority_then_recency() {
        let service = service();
        let low = service
            .create_task(CreateTaskParams {
                name: "low".into(),
                priority: crate::domain::models::TaskPriority::Low,
                ..Default::default()
            })
            .await;
        let critical = service
            .create_task(CreateTaskParams {
                name: "critical".into(),
                priority: crate::domain::models::TaskPriority::Critical,
                ..Default::default()
            })
            .await;

        let listed = service.get_tasks(&TaskFilter::default()).await;
        assert_eq!(listed[0].id, critical.id);
        assert_eq!(listed[1].id, low.id);
    }

    #[tokio::test]
    async fn affected_files_are_deduplicated() {
        let service = service();
        let task = service.create_task(CreateTaskParams::named("files")).await;
        service.add_affected_file(task.id, "src/lib.rs").await;
        service.add_affected_file(task.id, "src/lib.rs").await;
        let task = service.get_task(task.id).await.unwrap();
        assert_eq!(task.files_affected.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_enforces_count_cap() {
        let service = WorkflowService::new(
            Arc::new(MemoryTaskStore::default()),
            Arc::new(CompletionGates::default()),
            Arc::new(EventBus::default()),
            WorkflowConfig {
                max_completed_tasks: 2,
                ..Default::default()
            },
        );

        for i in 0..4 {
            let task = service.create_task(CreateTaskParams::named(format!("t{i}"))).await;
            service.complete_task(task.id, None).await;
        }

        let removed = service.cleanup_completed_tasks().await;
        assert_eq!(removed, 2);
        assert_eq!(service.status().await.counts.completed, 2);
    }

    #[tokio::test]
    async fn restarting_a_completed_task_clears_completion_markers() {
        let service = service();
        let task = service.create_task(CreateTaskParams::named("again")).await;
        service.complete_task(task.id, None).await;

        let reopened = service.start_task(task.id).await.unwrap();
        assert_eq!(reopened.status, TaskStatus::InProgress);
        assert!(reopened.completed_at.is_none());
        assert!(reopened.progress < 100);
    }

    #[tokio::test]
    async fn delete_unknown_returns_false() {
        let service = service();
        assert!(!service.delete_task(TaskId::new()).await);
    }
}
