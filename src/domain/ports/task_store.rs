//! Task store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskId};

/// Persistence interface for task records.
///
/// One logical document per task. Implementations must make individual
/// load failures non-fatal: a document that cannot be read or parsed is
/// skipped, never fabricated.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist one task, overwriting any previous document.
    async fn save(&self, task: &Task) -> DomainResult<()>;

    /// Load every readable task document.
    async fn load_all(&self) -> DomainResult<Vec<Task>>;

    /// Remove one task's document. Removing an absent document is not
    /// an error.
    async fn remove(&self, id: TaskId) -> DomainResult<()>;

    /// Remove every task document.
    async fn clear(&self) -> DomainResult<()>;
}
