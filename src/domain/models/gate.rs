//! Completion-gate domain model.
//!
//! A gate is a policy decision that can block a task's completion based
//! on guard/test evidence. Evaluation results are tagged variants, not
//! exceptions; throwing is reserved for graph-validation programmer
//! errors.

use serde::{Deserialize, Serialize};

use super::evidence::EvidenceKind;

/// Tool name suggested to produce fresh guard evidence.
pub const GUARD_TOOL: &str = "guard_validate";
/// Tool name suggested to produce fresh test evidence.
pub const TEST_TOOL: &str = "testing_run";

/// Priority assigned to guard tool suggestions. Lower runs first.
pub const GUARD_PRIORITY: u8 = 1;
/// Priority assigned to test tool suggestions.
pub const TEST_PRIORITY: u8 = 2;

/// Maximum number of detail entries carried in failing-evidence records
/// and event payloads.
pub const MAX_DETAILS: usize = 10;

/// Gate policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct GatePolicy {
    /// Guard evidence is required for completion.
    pub require_guard: bool,
    /// Test evidence is required for completion.
    pub require_test: bool,
    /// Maximum evidence age, in milliseconds, to count as present.
    pub freshness_window_ms: u64,
    /// Tests must have run after the most recent guard run.
    pub require_guard_before_test: bool,
    /// Failed evidence blocks completion.
    pub block_on_fail: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            require_guard: true,
            require_test: true,
            freshness_window_ms: 10 * 60 * 1000,
            require_guard_before_test: true,
            block_on_fail: true,
        }
    }
}

impl GatePolicy {
    /// The evidence kinds this policy requires, guard first.
    pub fn required_kinds(&self) -> Vec<EvidenceKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.require_guard {
            kinds.push(EvidenceKind::Guard);
        }
        if self.require_test {
            kinds.push(EvidenceKind::Test);
        }
        kinds
    }
}

/// Partial update merged atomically into a [`GatePolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct GatePolicyPatch {
    pub require_guard: Option<bool>,
    pub require_test: Option<bool>,
    pub freshness_window_ms: Option<u64>,
    pub require_guard_before_test: Option<bool>,
    pub block_on_fail: Option<bool>,
}

impl GatePolicyPatch {
    /// Apply every set field onto `policy`.
    pub fn apply_to(&self, policy: &mut GatePolicy) {
        if let Some(v) = self.require_guard {
            policy.require_guard = v;
        }
        if let Some(v) = self.require_test {
            policy.require_test = v;
        }
        if let Some(v) = self.freshness_window_ms {
            policy.freshness_window_ms = v;
        }
        if let Some(v) = self.require_guard_before_test {
            policy.require_guard_before_test = v;
        }
        if let Some(v) = self.block_on_fail {
            policy.block_on_fail = v;
        }
    }
}

/// Outcome category of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    /// All conditions satisfied; completion may proceed.
    Passed,
    /// A condition failed; completion must not proceed.
    Blocked,
    /// Evidence is missing or stale; completion waits for remediation.
    Pending,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Blocked => "blocked",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One failed evidence record in a gate result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingEvidence {
    /// Which evidence kind failed.
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    /// Human-readable summary of the failure.
    pub reason: String,
    /// Failing rule or test names, capped at [`MAX_DETAILS`] entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// A suggested tool invocation to remediate a non-passing gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: serde_json::Value,
    pub reason: String,
    /// Ordering hint; lower values should run first.
    pub priority: u8,
}

/// Result of one completion-gate evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateEvaluationResult {
    pub status: GateStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_evidence: Vec<EvidenceKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_evidence: Vec<EvidenceKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failing_evidence: Vec<FailingEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    /// Priority-ordered remediation suggestions; empty iff `status` is
    /// `passed`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_tool_calls: Vec<ToolCall>,
}

impl Default for GateStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl GateEvaluationResult {
    pub fn is_passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    /// Failing-evidence entries with `details` stripped, for event
    /// payloads that must stay small.
    pub fn failing_summary(&self) -> Vec<FailingEvidence> {
        self.failing_evidence
            .iter()
            .map(|f| FailingEvidence {
                kind: f.kind,
                reason: f.reason.clone(),
                details: Vec::new(),
            })
            .collect()
    }
}

/// Identifying context for the task whose completion is being gated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateContext {
    /// Task or workflow-node identifier, as a display string.
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Task tags, consulted for ruleset hinting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl GateContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: None,
            task_name: None,
            tags: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.task_name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}
