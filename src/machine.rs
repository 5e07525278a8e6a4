//! Workflow states and the pure transition rule.
//!
//! The transition rule is deliberately a function of `(completed stage,
//! context)` and nothing else: stage processors may be as non-deterministic
//! as they like, but given the same context the engine always derives the
//! same next state. Business rejections travel through context flags and
//! come out of [`evaluate`] as ordinary [`Transition`] values; only a
//! [`StageError`](crate::stage::StageError) is treated as a failure.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{SharedContext, keys};

/// States of the recovery workflow.
///
/// The main sequence is `Detecting → Analyzing → Planning → Approving →
/// Executing → Notifying → Completed`, with side branches to `Escalated`,
/// `RolledBack`, and `Failed`. The last four are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Detecting,
    Analyzing,
    Planning,
    Approving,
    Executing,
    Notifying,
    Completed,
    Failed,
    RolledBack,
    Escalated,
}

impl WorkflowState {
    /// The six processing stages, in execution order.
    pub const STAGES: [WorkflowState; 6] = [
        WorkflowState::Detecting,
        WorkflowState::Analyzing,
        WorkflowState::Planning,
        WorkflowState::Approving,
        WorkflowState::Executing,
        WorkflowState::Notifying,
    ];

    /// Whether the run never transitions further from this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed
                | WorkflowState::Failed
                | WorkflowState::RolledBack
                | WorkflowState::Escalated
        )
    }

    /// Whether a stage processor may be mapped to this state.
    #[must_use]
    pub fn is_stage(&self) -> bool {
        Self::STAGES.contains(self)
    }

    /// The state that follows this one in the main sequence; the end of the
    /// sequence yields `Completed`.
    #[must_use]
    pub fn next_in_sequence(&self) -> WorkflowState {
        match self {
            WorkflowState::Detecting => WorkflowState::Analyzing,
            WorkflowState::Analyzing => WorkflowState::Planning,
            WorkflowState::Planning => WorkflowState::Approving,
            WorkflowState::Approving => WorkflowState::Executing,
            WorkflowState::Executing => WorkflowState::Notifying,
            _ => WorkflowState::Completed,
        }
    }

    /// Stages strictly after `self` in sequence order (empty for non-stages).
    pub fn stages_after(&self) -> &'static [WorkflowState] {
        match Self::STAGES.iter().position(|s| s == self) {
            Some(idx) => &Self::STAGES[idx + 1..],
            None => &[],
        }
    }

    /// Encode into the persisted string form used as a checkpoint key.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            WorkflowState::Detecting => "DETECTING",
            WorkflowState::Analyzing => "ANALYZING",
            WorkflowState::Planning => "PLANNING",
            WorkflowState::Approving => "APPROVING",
            WorkflowState::Executing => "EXECUTING",
            WorkflowState::Notifying => "NOTIFYING",
            WorkflowState::Completed => "COMPLETED",
            WorkflowState::Failed => "FAILED",
            WorkflowState::RolledBack => "ROLLED_BACK",
            WorkflowState::Escalated => "ESCALATED",
        }
    }

    /// Decode a persisted string form back into a state.
    pub fn decode(s: &str) -> Option<WorkflowState> {
        match s {
            "DETECTING" => Some(WorkflowState::Detecting),
            "ANALYZING" => Some(WorkflowState::Analyzing),
            "PLANNING" => Some(WorkflowState::Planning),
            "APPROVING" => Some(WorkflowState::Approving),
            "EXECUTING" => Some(WorkflowState::Executing),
            "NOTIFYING" => Some(WorkflowState::Notifying),
            "COMPLETED" => Some(WorkflowState::Completed),
            "FAILED" => Some(WorkflowState::Failed),
            "ROLLED_BACK" => Some(WorkflowState::RolledBack),
            "ESCALATED" => Some(WorkflowState::Escalated),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Final (or pause) status reported for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    NoDisruption,
    NoRecoveryNeeded,
    EscalatedNoOptions,
    Rejected,
    /// Not terminal: the run is parked awaiting a human decision.
    PendingApproval,
    RolledBack,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::NoDisruption => "NO_DISRUPTION",
            RunStatus::NoRecoveryNeeded => "NO_RECOVERY_NEEDED",
            RunStatus::EscalatedNoOptions => "ESCALATED_NO_OPTIONS",
            RunStatus::Rejected => "REJECTED",
            RunStatus::PendingApproval => "PENDING_APPROVAL",
            RunStatus::RolledBack => "ROLLED_BACK",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the transition rule after one stage completes.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Continue with the given state.
    Advance(WorkflowState),
    /// Terminate in `Completed` with the given status and reason.
    Complete { status: RunStatus, reason: String },
    /// Park the run awaiting an external approval decision.
    Pause,
    /// Terminate in `Escalated` for manual handling.
    Escalate { reason: String },
    /// Run the rollback coordinator, then terminate in `RolledBack`.
    RollBack { reason: String },
    /// Terminate in `Failed`.
    Fail { reason: String },
}

/// Approval statuses the Approve stage may report.
pub mod approval_status {
    pub const PENDING: &str = "PENDING";
    pub const APPROVED: &str = "APPROVED";
    pub const AUTO_APPROVED: &str = "AUTO_APPROVED";
    pub const REJECTED: &str = "REJECTED";
}

/// Execution statuses the Execute stage may report.
pub mod execution_status {
    pub const COMPLETED: &str = "COMPLETED";
    pub const PARTIAL: &str = "PARTIAL";
    pub const FAILED: &str = "FAILED";
}

/// Ensure a recommendation exists once at least one scenario does.
///
/// When the Plan stage produced scenarios but flagged none as recommended,
/// the lowest-risk-score scenario is promoted so downstream stages always
/// have a target. Returns `true` when a fallback was selected.
pub fn normalize_planning(ctx: &mut SharedContext) -> bool {
    if ctx.get(keys::RECOMMENDED_SCENARIO).is_some_and(|v| !v.is_null()) {
        return false;
    }
    let Some(scenarios) = ctx.get_array(keys::RECOVERY_SCENARIOS) else {
        return false;
    };
    let fallback = scenarios
        .iter()
        .min_by(|a, b| {
            let ra = a.get("risk_score").and_then(Value::as_f64).unwrap_or(1.0);
            let rb = b.get("risk_score").and_then(Value::as_f64).unwrap_or(1.0);
            ra.total_cmp(&rb)
        })
        .cloned();
    match fallback {
        Some(mut scenario) => {
            if let Some(obj) = scenario.as_object_mut() {
                obj.insert("is_recommended".into(), Value::Bool(true));
                obj.entry("recommendation_reason")
                    .or_insert_with(|| Value::String("Lowest risk available option".into()));
            }
            let id = scenario.get("id").cloned().unwrap_or(Value::Null);
            ctx.set(keys::RECOMMENDED_SCENARIO, scenario);
            ctx.record(
                "engine",
                "fallback_recommendation",
                serde_json::json!({ "scenario_id": id }),
            );
            true
        }
        None => false,
    }
}

/// The transition rule: given the stage that just completed and the resulting
/// context, decide what happens next.
///
/// Pure with respect to the context; [`normalize_planning`] must already have
/// run for the `Planning` stage.
pub fn evaluate(completed: WorkflowState, ctx: &SharedContext) -> Transition {
    // A stage may flag an unrecoverable condition without raising an error.
    if ctx.get_bool(keys::FAILED) {
        return Transition::Fail {
            reason: format!("stage {completed} reported a terminal failure"),
        };
    }
    if ctx.get_bool(keys::REJECTED) {
        return Transition::Complete {
            status: RunStatus::Rejected,
            reason: format!("stage {completed} reported a business rejection"),
        };
    }

    match completed {
        WorkflowState::Detecting => {
            if !ctx.get_bool(keys::DISRUPTION_DETECTED) {
                return Transition::Complete {
                    status: RunStatus::NoDisruption,
                    reason: "no significant disruption detected".into(),
                };
            }
            Transition::Advance(WorkflowState::Analyzing)
        }
        WorkflowState::Analyzing => {
            // Absent flag defaults to recovery being required.
            let needs_recovery = ctx
                .get(keys::NEEDS_RECOVERY)
                .and_then(Value::as_bool)
                .unwrap_or(true);
            if !needs_recovery {
                return Transition::Complete {
                    status: RunStatus::NoRecoveryNeeded,
                    reason: "no cargo recovery needed".into(),
                };
            }
            Transition::Advance(WorkflowState::Planning)
        }
        WorkflowState::Planning => {
            let has_scenarios = ctx
                .get_array(keys::RECOVERY_SCENARIOS)
                .is_some_and(|s| !s.is_empty());
            if !has_scenarios {
                return Transition::Escalate {
                    reason: "no viable recovery options".into(),
                };
            }
            // normalize_planning guarantees a recommendation by this point.
            Transition::Advance(WorkflowState::Approving)
        }
        WorkflowState::Approving => match ctx.get_str(keys::APPROVAL_STATUS) {
            Some(approval_status::REJECTED) => Transition::Complete {
                status: RunStatus::Rejected,
                reason: "recovery plan rejected by approver".into(),
            },
            Some(approval_status::APPROVED) | Some(approval_status::AUTO_APPROVED) => {
                Transition::Advance(WorkflowState::Executing)
            }
            // PENDING, or an Approve stage that set nothing, parks the run.
            _ => Transition::Pause,
        },
        WorkflowState::Executing => match ctx.get_str(keys::EXECUTION_STATUS) {
            Some(execution_status::FAILED) | None => Transition::RollBack {
                reason: "execution failed".into(),
            },
            _ => Transition::Advance(WorkflowState::Notifying),
        },
        WorkflowState::Notifying => Transition::Complete {
            status: RunStatus::Completed,
            reason: "recovery workflow completed".into(),
        },
        terminal => Transition::Complete {
            status: RunStatus::Completed,
            reason: format!("no transition from {terminal}"),
        },
    }
}
