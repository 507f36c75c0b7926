//! Evidence domain model.
//!
//! Evidence records prove that a guard check or test run occurred with a
//! given outcome. They are written by external collaborators (guard
//! validators, test runners) and read by the completion-gate engine;
//! the core never mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a guard or test run.
///
/// `Skipped` only occurs on test evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Passed,
    Failed,
    Pending,
    Skipped,
}

impl EvidenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of evidence a gate condition refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Guard,
    Test,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guard => "guard",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of the most recent guard validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardEvidence {
    pub status: EvidenceStatus,
    /// Identifier of the guard report this record summarizes.
    pub report_id: String,
    /// Names of the rules that failed, when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failing_rules: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl GuardEvidence {
    pub fn passed(report_id: impl Into<String>) -> Self {
        Self {
            status: EvidenceStatus::Passed,
            report_id: report_id.into(),
            failing_rules: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(report_id: impl Into<String>, failing_rules: Vec<String>) -> Self {
        Self {
            status: EvidenceStatus::Failed,
            report_id: report_id.into(),
            failing_rules,
            timestamp: Utc::now(),
        }
    }
}

/// Result of the most recent test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEvidence {
    pub status: EvidenceStatus,
    /// Identifier of the test run this record summarizes.
    pub run_id: String,
    /// Names of the tests that failed, when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failing_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_errors_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_failures_count: Option<u32>,
    /// Aggregate health score in `[0, 100]` reported by the runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TestEvidence {
    pub fn passed(run_id: impl Into<String>) -> Self {
        Self {
            status: EvidenceStatus::Passed,
            run_id: run_id.into(),
            failing_tests: Vec::new(),
            console_errors_count: None,
            network_failures_count: None,
            health_score: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(run_id: impl Into<String>, failing_tests: Vec<String>) -> Self {
        Self {
            status: EvidenceStatus::Failed,
            run_id: run_id.into(),
            failing_tests,
            console_errors_count: None,
            network_failures_count: None,
            health_score: None,
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot of the most recent evidence per kind, owned by the external
/// state provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_guard_run: Option<GuardEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_run: Option<TestEvidence>,
}

impl EvidenceState {
    /// Timestamp of the evidence record for `kind`, if present.
    pub fn timestamp_of(&self, kind: EvidenceKind) -> Option<DateTime<Utc>> {
        match kind {
            EvidenceKind::Guard => self.last_guard_run.as_ref().map(|e| e.timestamp),
            EvidenceKind::Test => self.last_test_run.as_ref().map(|e| e.timestamp),
        }
    }

    /// Status of the evidence record for `kind`, if present.
    pub fn status_of(&self, kind: EvidenceKind) -> Option<EvidenceStatus> {
        match kind {
            EvidenceKind::Guard => self.last_guard_run.as_ref().map(|e| e.status),
            EvidenceKind::Test => self.last_test_run.as_ref().map(|e| e.status),
        }
    }
}
