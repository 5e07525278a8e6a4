//! Per-run state the engine tracks between stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::SharedContext;
use crate::escalation::ApprovalTicket;
use crate::execution::ExecutionStep;
use crate::machine::{RunStatus, WorkflowState};
use crate::rollback::{CommittedAction, CompensationRecord};

/// One audit-trail entry for a state transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub detail: String,
}

/// Mutable record of one workflow run.
///
/// Owned by the engine's registry behind a per-run async mutex; only the task
/// currently driving the run touches it. The committed-action list is the
/// authoritative rollback input and is persisted with every checkpoint.
#[derive(Clone, Debug)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub state: WorkflowState,
    /// Final status once the run terminates, or `PendingApproval` while
    /// parked.
    pub status: Option<RunStatus>,
    /// Human-readable reason accompanying any non-completed outcome.
    pub reason: Option<String>,
    pub context: SharedContext,
    /// Side effects applied so far, in commit order.
    pub committed_actions: Vec<CommittedAction>,
    /// Compensation outcomes, populated only when a rollback ran.
    pub compensation_records: Vec<CompensationRecord>,
    /// The execution plan with final step statuses, once Execute ran.
    pub execution_steps: Vec<ExecutionStep>,
    /// Pending approval request while the run is parked at Approving.
    pub approval_ticket: Option<ApprovalTicket>,
    /// Monotonic checkpoint sequence number; 0 before the first checkpoint.
    pub checkpoint_seq: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub audit: Vec<AuditEntry>,
}

impl WorkflowRun {
    pub fn new(workflow_id: impl Into<String>, context: SharedContext) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            state: WorkflowState::Detecting,
            status: None,
            reason: None,
            context,
            committed_actions: Vec::new(),
            compensation_records: Vec::new(),
            execution_steps: Vec::new(),
            approval_ticket: None,
            checkpoint_seq: 0,
            started_at: now,
            updated_at: now,
            audit: Vec::new(),
        }
    }

    /// Move to a new state, appending an audit entry.
    pub fn transition_to(&mut self, to: WorkflowState, detail: impl Into<String>) {
        let now = Utc::now();
        self.audit.push(AuditEntry {
            at: now,
            from: self.state,
            to,
            detail: detail.into(),
        });
        self.state = to;
        self.updated_at = now;
    }

    /// Whether the run is parked awaiting an approval decision.
    pub fn is_paused(&self) -> bool {
        self.state == WorkflowState::Approving && self.status == Some(RunStatus::PendingApproval)
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            workflow_id: self.workflow_id.clone(),
            state: self.state,
            status: self.status,
            reason: self.reason.clone(),
            checkpoint_seq: self.checkpoint_seq,
            execution_steps: self.execution_steps.clone(),
            compensation_records: self.compensation_records.clone(),
            approval_ticket: self.approval_ticket.clone(),
            audit: self.audit.clone(),
        }
    }
}

/// Read-only snapshot of a run's outcome, returned by engine operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub status: Option<RunStatus>,
    pub reason: Option<String>,
    pub checkpoint_seq: u64,
    pub execution_steps: Vec<ExecutionStep>,
    pub compensation_records: Vec<CompensationRecord>,
    pub approval_ticket: Option<ApprovalTicket>,
    pub audit: Vec<AuditEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_appends_audit() {
        let mut run = WorkflowRun::new("wf-1", SharedContext::new());
        run.transition_to(WorkflowState::Analyzing, "disruption confirmed");
        run.transition_to(WorkflowState::Planning, "impact assessed");
        assert_eq!(run.state, WorkflowState::Planning);
        assert_eq!(run.audit.len(), 2);
        assert_eq!(run.audit[0].from, WorkflowState::Detecting);
        assert_eq!(run.audit[1].to, WorkflowState::Planning);
    }

    #[test]
    fn paused_requires_pending_status() {
        let mut run = WorkflowRun::new("wf-1", SharedContext::new());
        run.state = WorkflowState::Approving;
        assert!(!run.is_paused());
        run.status = Some(RunStatus::PendingApproval);
        assert!(run.is_paused());
    }
}
