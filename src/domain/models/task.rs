//! Task domain model.
//!
//! Tasks are the persistent units of work managed by the workflow
//! service. They may nest: a subtask stores its parent's id and the
//! parent lists the subtask id, never a live reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not started.
    Pending,
    /// The current task; at most one per service instance.
    InProgress,
    /// Started, then set aside.
    Paused,
    /// Held back by a failed completion gate.
    Blocked,
    /// Finished with a passed (or bypassed) gate.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Abandoned.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active (non-terminal) state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority level for tasks. Higher sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Discriminator for task notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Comment,
    Decision,
    Blocker,
}

impl Default for NoteType {
    fn default() -> Self {
        Self::Comment
    }
}

/// A timestamped annotation attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNote {
    pub content: String,
    #[serde(default)]
    pub note_type: NoteType,
    pub timestamp: DateTime<Utc>,
}

impl TaskNote {
    pub fn new(content: impl Into<String>, note_type: NoteType) -> Self {
        Self {
            content: content.into(),
            note_type,
            timestamp: Utc::now(),
        }
    }
}

/// A persistent task record.
///
/// Serialized one JSON document per task with ISO-8601 date strings.
/// Invariants maintained by the workflow service:
/// - `progress == 100` iff `status == completed`;
/// - `completed_at` is set exactly when `status == completed`;
/// - `parent_id` refers to an existing task whose `subtasks` lists this id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Completion percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<TaskNote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_affected: Vec<String>,
    /// Opaque checkpoint ids; the documents live under `checkpoints/`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_tokens: Option<u64>,
}

impl Task {
    /// Create a pending task from creation parameters.
    pub fn from_params(params: CreateTaskParams) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            name: params.name,
            description: params.description,
            status: TaskStatus::Pending,
            progress: 0,
            priority: params.priority,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
            parent_id: params.parent_id,
            subtasks: Vec::new(),
            tags: params.tags,
            notes: Vec::new(),
            files_affected: Vec::new(),
            checkpoints: Vec::new(),
            estimated_tokens: params.estimated_tokens,
            actual_tokens: None,
        }
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Set progress, clamped to `[0, 100]`. Returns true if the stored
    /// value changed.
    pub fn set_progress(&mut self, progress: u8) -> bool {
        let clamped = progress.min(100);
        if self.progress == clamped {
            return false;
        }
        self.progress = clamped;
        true
    }
}

/// Parameters for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
}

impl CreateTaskParams {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Field-level patch applied by `update_task`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Clamped to `[0, 100]` on apply.
    pub progress: Option<u8>,
    pub priority: Option<TaskPriority>,
    pub tags: Option<Vec<String>>,
    pub actual_tokens: Option<u64>,
}

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub parent_id: Option<TaskId>,
    pub tag: Option<String>,
}

impl TaskFilter {
    /// Whether `task` satisfies every set criterion.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(parent_id) = self.parent_id {
            if task.parent_id != Some(parent_id) {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !task.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_clamps_to_100() {
        let mut task = Task::from_params(CreateTaskParams::named("t"));
        assert!(task.set_progress(150));
        assert_eq!(task.progress, 100);
        assert!(!task.set_progress(200));
    }

    #[test]
    fn priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }

    #[test]
    fn task_serializes_with_iso_dates() {
        let task = Task::from_params(CreateTaskParams::named("serialize me"));
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["status"], "pending");
        assert!(json["createdAt"].as_str().unwrap().contains('T'));
        assert!(json.get("completedAt").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn filter_matches_on_tag_and_status() {
        let mut task = Task::from_params(CreateTaskParams {
            name: "filtered".into(),
            tags: vec!["frontend".into()],
            ..Default::default()
        });
        task.status = TaskStatus::Paused;

        let filter = TaskFilter {
            status: Some(TaskStatus::Paused),
            tag: Some("frontend".into()),
            ..Default::default()
        };
        assert!(filter.matches(&task));

        let wrong_tag = TaskFilter {
            tag: Some("backend".into()),
            ..Default::default()
        };
        assert!(!wrong_tag.matches(&task));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Blocked.is_active());
        assert!(TaskStatus::InProgress.is_active());
    }
}
