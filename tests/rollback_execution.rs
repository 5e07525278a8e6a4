mod common;

use async_trait::async_trait;
use common::{ScriptedStage, StubActions, build_engine, happy_path_stages, happy_path_with_actions};
use recoflow::context::SharedContext;
use recoflow::execution::{StepAction, StepStatus};
use recoflow::machine::{RunStatus, WorkflowState};
use recoflow::rollback::{CommittedAction, CompensationError, CompensationHandler, CompensationStatus};
use recoflow::runtime::CheckpointStore;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Handler that records compensation order.
struct Recording {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CompensationHandler for Recording {
    async fn compensate(&self, action: &CommittedAction) -> Result<(), CompensationError> {
        self.seen.lock().unwrap().push(action.target_id.clone());
        Ok(())
    }
}

#[tokio::test]
async fn capacity_validation_failure_stops_the_plan_before_any_rebooking() {
    let setup = build_engine(|builder| {
        happy_path_with_actions(
            builder,
            StubActions {
                fail_validate: true,
                ..Default::default()
            },
        )
    })
    .await;

    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();

    assert_eq!(report.state, WorkflowState::RolledBack);
    assert_eq!(report.status, Some(RunStatus::RolledBack));

    let failed: Vec<&StepAction> = report
        .execution_steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .map(|s| &s.action)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0], StepAction::ValidateCapacity { .. }));

    // Every rebooking step stayed untouched, so there was nothing to
    // compensate.
    assert!(report
        .execution_steps
        .iter()
        .filter(|s| matches!(s.action, StepAction::Rebook { .. }))
        .all(|s| s.status == StepStatus::Pending));
    assert!(report.compensation_records.is_empty());
}

#[tokio::test]
async fn one_failed_rebooking_yields_partial_completion() {
    let setup = build_engine(|builder| {
        happy_path_with_actions(
            builder,
            StubActions {
                fail_rebook: vec!["SHIP-001".into()],
                ..Default::default()
            },
        )
    })
    .await;

    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();

    // Partial recovery still completes; failures are reported, not rolled
    // back.
    assert_eq!(report.state, WorkflowState::Completed);
    assert_eq!(report.status, Some(RunStatus::Completed));

    let rebook_statuses: Vec<(String, StepStatus)> = report
        .execution_steps
        .iter()
        .filter_map(|s| match &s.action {
            StepAction::Rebook { item_id, .. } => Some((item_id.clone(), s.status)),
            _ => None,
        })
        .collect();
    assert!(rebook_statuses.contains(&("SHIP-002".into(), StepStatus::Completed)));
    assert!(rebook_statuses.contains(&("SHIP-001".into(), StepStatus::Failed)));

    let executing = setup
        .store
        .load(&report.workflow_id, WorkflowState::Executing)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(executing.context.get("execution_status"), Some(&json!("PARTIAL")));
    assert_eq!(executing.context.get("items_recovered"), Some(&json!(1)));
    assert_eq!(executing.context.get("items_failed"), Some(&json!(1)));
}

#[tokio::test]
async fn rollback_compensates_in_exact_reverse_commit_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let setup = build_engine(|builder| {
        happy_path_stages(builder)
            .stage(
                WorkflowState::Executing,
                Arc::new(
                    ScriptedStage::new()
                        .commit("REBOOK", "A")
                        .commit("REBOOK", "B")
                        .commit("REBOOK", "C")
                        .set("execution_status", json!("FAILED")),
                ),
            )
            .compensation("REBOOK", Arc::new(Recording { seen: seen.clone() }))
    })
    .await;

    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();

    assert_eq!(report.state, WorkflowState::RolledBack);
    assert_eq!(*seen.lock().unwrap(), vec!["C", "B", "A"]);
    assert!(report
        .compensation_records
        .iter()
        .all(|r| r.status == CompensationStatus::Success));
}

#[tokio::test]
async fn stage_error_after_commits_triggers_rollback() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let setup = build_engine(|builder| {
        happy_path_stages(builder)
            .stage(
                WorkflowState::Notifying,
                Arc::new(ScriptedStage::new().failing("notification gateway unreachable")),
            )
            .compensation("REBOOK", Arc::new(Recording { seen: seen.clone() }))
    })
    .await;

    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();

    assert_eq!(report.state, WorkflowState::RolledBack);
    assert!(report.reason.as_deref().unwrap().contains("NOTIFYING failed"));
    // Execute committed critical-first; rollback reverses that.
    assert_eq!(*seen.lock().unwrap(), vec!["SHIP-001", "SHIP-002"]);
    // Compensated rebookings are reflected on the plan steps.
    assert!(report
        .execution_steps
        .iter()
        .filter(|s| matches!(s.action, StepAction::Rebook { .. }))
        .all(|s| s.status == StepStatus::RolledBack));
}

#[tokio::test]
async fn stage_error_without_commits_fails_plainly() {
    let setup = build_engine(|builder| {
        happy_path_stages(builder).stage(
            WorkflowState::Planning,
            Arc::new(ScriptedStage::new().failing("scenario provider offline")),
        )
    })
    .await;

    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    assert_eq!(report.state, WorkflowState::Failed);
    assert_eq!(report.status, Some(RunStatus::Failed));
    assert!(report.reason.as_deref().unwrap().contains("scenario provider offline"));
    assert!(report.compensation_records.is_empty());
}

#[tokio::test]
async fn unhandled_compensation_is_recorded_as_failed() {
    let setup = build_engine(|builder| {
        // No compensation handler registered at all.
        happy_path_stages(builder).stage(
            WorkflowState::Executing,
            Arc::new(
                ScriptedStage::new()
                    .commit("REBOOK", "A")
                    .set("execution_status", json!("FAILED")),
            ),
        )
    })
    .await;

    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    assert_eq!(report.state, WorkflowState::RolledBack);
    assert_eq!(report.compensation_records.len(), 1);
    assert_eq!(report.compensation_records[0].status, CompensationStatus::Failed);
}
