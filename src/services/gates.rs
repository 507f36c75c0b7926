//! Completion-gate engine.
//!
//! Decides whether a task may complete, based on guard/test evidence
//! freshness, precedence, and pass state. Evaluation is a pure function
//! of `(evidence, policy, context, now)`; for identical inputs the
//! result is identical.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::models::evidence::{EvidenceKind, EvidenceState, EvidenceStatus};
use crate::domain::models::gate::{
    FailingEvidence, GateContext, GateEvaluationResult, GatePolicy, GatePolicyPatch, GateStatus,
    ToolCall, GUARD_PRIORITY, GUARD_TOOL, MAX_DETAILS, TEST_PRIORITY, TEST_TOOL,
};

/// Why an evidence kind needs a (re-)run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Remediation {
    Missing,
    Stale,
    Failing,
    Precedence,
}

/// Evidence-based completion decision engine.
pub struct CompletionGates {
    policy: RwLock<GatePolicy>,
}

impl Default for CompletionGates {
    fn default() -> Self {
        Self::new(GatePolicy::default())
    }
}

impl CompletionGates {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// Current policy snapshot.
    pub fn config(&self) -> GatePolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge a partial update atomically into the current policy.
    pub fn update_config(&self, patch: &GatePolicyPatch) {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        patch.apply_to(&mut policy);
    }

    /// Evaluate the gates against the current instant.
    pub fn evaluate(&self, evidence: &EvidenceState, context: &GateContext) -> GateEvaluationResult {
        self.evaluate_at(evidence, context, Utc::now())
    }

    /// Evaluate the gates against an explicit `now`.
    pub fn evaluate_at(
        &self,
        evidence: &EvidenceState,
        context: &GateContext,
        now: DateTime<Utc>,
    ) -> GateEvaluationResult {
        let policy = self.config();

        let mut missing_evidence = Vec::new();
        let mut stale_evidence = Vec::new();

        for kind in policy.required_kinds() {
            match evidence.timestamp_of(kind) {
                None => missing_evidence.push(kind),
                Some(timestamp) => {
                    let age_ms = now.signed_duration_since(timestamp).num_milliseconds();
                    if age_ms > policy.freshness_window_ms as i64 {
                        stale_evidence.push(kind);
                    }
                }
            }
        }

        // Guard-before-test precedence: test evidence produced before the
        // latest guard run must be re-run.
        let precedence_violated = policy.require_guard_before_test
            && matches!(
                (
                    evidence.timestamp_of(EvidenceKind::Guard),
                    evidence.timestamp_of(EvidenceKind::Test),
                ),
                (Some(guard_ts), Some(test_ts)) if test_ts < guard_ts
            );

        let mut failing_evidence = Vec::new();
        if policy.block_on_fail {
            if let Some(guard) = &evidence.last_guard_run {
                if guard.status == EvidenceStatus::Failed {
                    failing_evidence.push(FailingEvidence {
                        kind: EvidenceKind::Guard,
                        reason: format!(
                            "guard validation failed {} rule(s)",
                            guard.failing_rules.len()
                        ),
                        details: capped(&guard.failing_rules),
                    });
                }
            }
            if let Some(test) = &evidence.last_test_run {
                if test.status == EvidenceStatus::Failed {
                    failing_evidence.push(FailingEvidence {
                        kind: EvidenceKind::Test,
                        reason: format!("test run failed {} test(s)", test.failing_tests.len()),
                        details: capped(&test.failing_tests),
                    });
                }
            }
        }

        // Failing takes precedence over stale so the suggestions stay
        // actionable; precedence violations block even when everything
        // is otherwise fresh.
        let status = if !failing_evidence.is_empty() || precedence_violated {
            GateStatus::Blocked
        } else if !missing_evidence.is_empty() || !stale_evidence.is_empty() {
            GateStatus::Pending
        } else {
            GateStatus::Passed
        };

        let blocked_reason = if !failing_evidence.is_empty() {
            let kinds: Vec<&str> = failing_evidence.iter().map(|f| f.kind.as_str()).collect();
            Some(format!("failing evidence: {}", kinds.join(", ")))
        } else if precedence_violated {
            Some("test must be re-run after guard passed".to_string())
        } else {
            None
        };

        let next_tool_calls = if status == GateStatus::Passed {
            Vec::new()
        } else {
            self.build_tool_calls(
                context,
                remediation_for(EvidenceKind::Guard, &missing_evidence, &stale_evidence, &failing_evidence, false),
                remediation_for(EvidenceKind::Test, &missing_evidence, &stale_evidence, &failing_evidence, precedence_violated),
            )
        };

        GateEvaluationResult {
            status,
            missing_evidence,
            stale_evidence,
            failing_evidence,
            blocked_reason,
            next_tool_calls,
        }
    }

    fn build_tool_calls(
        &self,
        context: &GateContext,
        guard: Option<Remediation>,
        test: Option<Remediation>,
    ) -> Vec<ToolCall> {
        let mut calls = Vec::new();

        if let Some(remediation) = guard {
            let mut args = json!({ "taskId": context.task_id });
            if let Some(ruleset) = ruleset_hint(context) {
                args["ruleset"] = json!(ruleset);
            }
            calls.push(ToolCall {
                tool: GUARD_TOOL.to_string(),
                args,
                reason: guard_reason(remediation),
                priority: GUARD_PRIORITY,
            });
        }

        if let Some(remediation) = test {
            calls.push(ToolCall {
                tool: TEST_TOOL.to_string(),
                args: json!({ "taskId": context.task_id, "scope": "affected" }),
                reason: test_reason(remediation),
                priority: TEST_PRIORITY,
            });
        }

        calls.sort_by_key(|c| c.priority);
        calls
    }
}

/// The dominant reason `kind` needs a run, if any. Failing outranks
/// stale outranks missing; a precedence violation forces a test re-run.
fn remediation_for(
    kind: EvidenceKind,
    missing: &[EvidenceKind],
    stale: &[EvidenceKind],
    failing: &[FailingEvidence],
    precedence_violated: bool,
) -> Option<Remediation> {
    if failing.iter().any(|f| f.kind == kind) {
        Some(Remediation::Failing)
    } else if stale.contains(&kind) {
        Some(Remediation::Stale)
    } else if missing.contains(&kind) {
        Some(Remediation::Missing)
    } else if precedence_violated && kind == EvidenceKind::Test {
        Some(Remediation::Precedence)
    } else {
        None
    }
}

fn guard_reason(remediation: Remediation) -> String {
    match remediation {
        Remediation::Missing => "guard evidence missing; run guard validation".to_string(),
        Remediation::Stale => "guard evidence is stale; re-run guard validation".to_string(),
        Remediation::Failing => "guard rules failed; fix and re-run guard validation".to_string(),
        Remediation::Precedence => "re-run guard validation".to_string(),
    }
}

fn test_reason(remediation: Remediation) -> String {
    match remediation {
        Remediation::Missing => "test evidence missing; run the affected tests".to_string(),
        Remediation::Stale => "test evidence is stale; re-run the affected tests".to_string(),
        Remediation::Failing => "tests failed; fix and re-run the affected tests".to_string(),
        Remediation::Precedence => "test must be re-run after guard passed".to_string(),
    }
}

/// Infer a guard ruleset from the task's name and tags.
fn ruleset_hint(context: &GateContext) -> Option<&'static str> {
    let mut haystack = context.task_name.clone().unwrap_or_default();
    for tag in &context.tags {
        haystack.push(' ');
        haystack.push_str(tag);
    }
    let haystack = haystack.to_lowercase();

    if haystack.contains("frontend") {
        Some("frontend")
    } else if haystack.contains("backend") {
        Some("backend")
    } else {
        None
    }
}

fn capped(details: &[String]) -> Vec<String> {
    details.iter().take(MAX_DETAILS).cloned().collect()
}
