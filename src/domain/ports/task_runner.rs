//! Task runner port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{ExecutionContext, WorkflowNode};

/// Opaque result of running one workflow node.
///
/// A set `error` marks the node failed regardless of `output`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunnerOutput {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
        }
    }

    /// Empty successful output.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Collaborator that decides what "running a task node" means.
///
/// The executor treats the return value opaquely and never re-throws:
/// runner failures come back as `RunnerOutput::error`.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run one node with a snapshot of the execution context.
    async fn run(&self, node: &WorkflowNode, context: &ExecutionContext) -> RunnerOutput;
}
