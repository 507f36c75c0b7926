//! Filesystem task store: one JSON document per task.
//!
//! The store lives under the project-scoped `.taskgate/` directory:
//! `tasks/<uuid>.json` per task, plus an opaque `checkpoints/` area the
//! core only references by id. Writes are atomic via
//! write-temp-then-rename; unreadable documents are skipped on load,
//! never fabricated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskId};
use crate::domain::ports::TaskStore;

/// Name of the hidden project-scoped directory.
pub const PROJECT_DIR: &str = ".taskgate";
/// Subdirectory holding task documents.
const TASKS_DIR: &str = "tasks";
/// Subdirectory holding opaque checkpoint documents.
const CHECKPOINTS_DIR: &str = "checkpoints";
/// Suffix for in-flight writes, skipped on load.
const TMP_SUFFIX: &str = ".tmp";

/// JSON-file-per-task store rooted in a project directory.
pub struct FsTaskStore {
    root: PathBuf,
}

impl FsTaskStore {
    /// Create a store under `<project_root>/.taskgate/`.
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().join(PROJECT_DIR),
        }
    }

    /// The `.taskgate/` directory this store writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    /// Path of the opaque checkpoint document for `checkpoint_id`.
    pub fn checkpoint_path(&self, checkpoint_id: &str) -> PathBuf {
        self.root
            .join(CHECKPOINTS_DIR)
            .join(format!("{checkpoint_id}.json"))
    }

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.tasks_dir().join(format!("{id}.json"))
    }

    async fn ensure_layout(&self) -> DomainResult<()> {
        tokio::fs::create_dir_all(self.tasks_dir()).await?;
        tokio::fs::create_dir_all(self.root.join(CHECKPOINTS_DIR)).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FsTaskStore {
    async fn save(&self, task: &Task) -> DomainResult<()> {
        self.ensure_layout().await?;

        let path = self.task_path(task.id);
        let tmp_path = self.tasks_dir().join(format!("{}.json{TMP_SUFFIX}", task.id));
        let body = serde_json::to_vec_pretty(task)?;

        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        debug!(task_id = %task.id, path = %path.display(), "task persisted");
        Ok(())
    }

    async fn load_all(&self) -> DomainResult<Vec<Task>> {
        let tasks_dir = self.tasks_dir();
        if !tasks_dir.exists() {
            return Ok(Vec::new());
        }

        let mut tasks = Vec::new();
        let mut entries = tokio::fs::read_dir(&tasks_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") || name.ends_with(TMP_SUFFIX) {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable task document");
                    continue;
                }
            };
            match serde_json::from_slice::<Task>(&bytes) {
                Ok(task) => tasks.push(task),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unparsable task document");
                }
            }
        }
        Ok(tasks)
    }

    async fn remove(&self, id: TaskId) -> DomainResult<()> {
        match tokio::fs::remove_file(self.task_path(id)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn clear(&self) -> DomainResult<()> {
        let tasks_dir = self.tasks_dir();
        if !tasks_dir.exists() {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(&tasks_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().ends_with(".json") {
                if let Err(error) = tokio::fs::remove_file(entry.path()).await {
                    warn!(path = %entry.path().display(), %error, "failed to remove task document");
                }
            }
        }
        Ok(())
    }
}

/// In-memory store for tests and gate-free embedding.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &Task) -> DomainResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_all(&self) -> DomainResult<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn remove(&self, id: TaskId) -> DomainResult<()> {
        self.tasks.write().await.remove(&id);
        Ok(())
    }

    async fn clear(&self) -> DomainResult<()> {
        self.tasks.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CreateTaskParams, TaskStatus};

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTaskStore::new(dir.path());

        let mut task = Task::from_params(CreateTaskParams::named("persist me"));
        task.status = TaskStatus::Paused;
        task.tags.push("frontend".into());
        store.save(&task).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], task);
    }

    #[tokio::test]
    async fn unparsable_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTaskStore::new(dir.path());

        let task = Task::from_params(CreateTaskParams::named("good"));
        store.save(&task).await.unwrap();

        let bad_path = store.tasks_dir().join("garbage.json");
        tokio::fs::write(&bad_path, b"{not json").await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, task.id);
    }

    #[tokio::test]
    async fn remove_absent_document_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTaskStore::new(dir.path());
        assert!(store.remove(TaskId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn clear_removes_every_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTaskStore::new(dir.path());

        for i in 0..3 {
            let task = Task::from_params(CreateTaskParams::named(format!("t{i}")));
            store.save(&task).await.unwrap();
        }
        store.clear().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
