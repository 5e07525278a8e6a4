mod common;

use chrono::{Duration, Utc};
use common::{ScriptedStage, build_engine, happy_path_stages};
use recoflow::context::SharedContext;
use recoflow::escalation::{ApprovalLevel, Escalation, EscalationTimeouts, TicketStatus};
use recoflow::machine::{RunStatus, WorkflowState};
use recoflow::event_bus::EventBus;
use recoflow::runtime::{ApprovalDecision, EngineConfig, WorkflowEngine};
use serde_json::json;
use std::sync::Arc;

fn pending_approval(
    builder: recoflow::runtime::WorkflowEngineBuilder,
) -> recoflow::runtime::WorkflowEngineBuilder {
    happy_path_stages(builder).stage(
        WorkflowState::Approving,
        Arc::new(ScriptedStage::new().set("approval_status", json!("PENDING"))),
    )
}

#[tokio::test]
async fn pending_approval_parks_the_run_with_a_supervisor_ticket() {
    let setup = build_engine(pending_approval).await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();

    assert_eq!(report.state, WorkflowState::Approving);
    assert_eq!(report.status, Some(RunStatus::PendingApproval));

    let ticket = report.approval_ticket.expect("ticket opened");
    assert_eq!(ticket.level, ApprovalLevel::Supervisor);
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.timeout_at, ticket.requested_at + Duration::minutes(15));
    assert!(report.execution_steps.is_empty());
}

#[tokio::test]
async fn sweep_advances_exactly_one_level_with_a_fresh_deadline() {
    let setup = build_engine(pending_approval).await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    let opened = report.approval_ticket.unwrap().requested_at;

    // 14 minutes in: nothing expires.
    assert!(setup
        .engine
        .sweep_escalations(opened + Duration::minutes(14))
        .await
        .is_empty());

    // 16 minutes in: supervisor ticket lapses, manager ticket armed for 30.
    let sweep_at = opened + Duration::minutes(16);
    let outcomes = setup.engine.sweep_escalations(sweep_at).await;
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].escalation {
        Escalation::Advanced { from, to, ticket } => {
            assert_eq!(*from, ApprovalLevel::Supervisor);
            assert_eq!(*to, ApprovalLevel::Manager);
            assert_eq!(ticket.timeout_at, sweep_at + Duration::minutes(30));
        }
        other => panic!("expected Advanced, got {other:?}"),
    }

    let status = setup.engine.status(&report.workflow_id).await.unwrap();
    assert_eq!(status.status, Some(RunStatus::PendingApproval));
    assert_eq!(status.approval_ticket.unwrap().level, ApprovalLevel::Manager);
}

#[tokio::test]
async fn exhausted_escalation_is_terminal() {
    let setup = build_engine(|builder| {
        happy_path_stages(builder).stage(
            WorkflowState::Approving,
            Arc::new(
                ScriptedStage::new()
                    .set("approval_status", json!("PENDING"))
                    .set("required_approval_level", json!("EXECUTIVE")),
            ),
        )
    })
    .await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    let opened = report.approval_ticket.unwrap().requested_at;

    let outcomes = setup
        .engine
        .sweep_escalations(opened + Duration::minutes(61))
        .await;
    assert!(matches!(outcomes[0].escalation, Escalation::Exhausted));

    let status = setup.engine.status(&report.workflow_id).await.unwrap();
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(status.status, Some(RunStatus::Failed));
    assert!(status.reason.as_deref().unwrap().contains("EXECUTIVE"));
    assert_eq!(status.approval_ticket.unwrap().status, TicketStatus::Timeout);

    // Terminal runs are never swept again.
    assert!(setup
        .engine
        .sweep_escalations(Utc::now() + Duration::days(1))
        .await
        .is_empty());
}

#[tokio::test]
async fn sweep_reaches_runs_known_only_to_the_store() {
    let setup = build_engine(pending_approval).await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    assert_eq!(report.status, Some(RunStatus::PendingApproval));
    setup.engine.shutdown().await;

    // After a restart the run exists only in the checkpoint store; the sweep
    // must still find and escalate it.
    let engine2 = pending_approval(
        WorkflowEngine::builder()
            .checkpoint_store(setup.store.clone())
            .event_bus(EventBus::default()),
    )
    .build()
    .await
    .unwrap();

    let outcomes = engine2
        .sweep_escalations(Utc::now() + Duration::minutes(16))
        .await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].workflow_id, report.workflow_id);
    assert!(matches!(
        outcomes[0].escalation,
        Escalation::Advanced {
            from: ApprovalLevel::Supervisor,
            to: ApprovalLevel::Manager,
            ..
        }
    ));

    let status = engine2.status(&report.workflow_id).await.unwrap();
    assert_eq!(status.status, Some(RunStatus::PendingApproval));
    assert_eq!(status.approval_ticket.unwrap().level, ApprovalLevel::Manager);
}

#[tokio::test]
async fn background_timer_sweeps_at_the_configured_interval() {
    let setup = build_engine(|builder| {
        pending_approval(builder).config(
            EngineConfig::default()
                .with_escalation(EscalationTimeouts {
                    supervisor: Duration::milliseconds(50),
                    manager: Duration::minutes(30),
                    executive: Duration::minutes(60),
                })
                .with_escalation_sweep_interval(std::time::Duration::from_millis(20)),
        )
    })
    .await;
    let engine = Arc::new(setup.engine);

    let report = engine.start_and_run(SharedContext::new()).await.unwrap();
    assert_eq!(report.status, Some(RunStatus::PendingApproval));

    let timer = engine.spawn_escalation_timer();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    timer.shutdown();

    let status = engine.status(&report.workflow_id).await.unwrap();
    assert_eq!(status.status, Some(RunStatus::PendingApproval));
    assert_eq!(status.approval_ticket.unwrap().level, ApprovalLevel::Manager);
}

#[tokio::test]
async fn approval_decision_resumes_execution() {
    let setup = build_engine(pending_approval).await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    assert_eq!(report.status, Some(RunStatus::PendingApproval));

    let finished = setup
        .engine
        .decide(
            &report.workflow_id,
            ApprovalDecision::Approve {
                approver: "supervisor-7".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(finished.state, WorkflowState::Completed);
    assert_eq!(finished.status, Some(RunStatus::Completed));
    assert!(!finished.execution_steps.is_empty());
}

#[tokio::test]
async fn rejection_is_terminal_and_never_replans() {
    let setup = build_engine(pending_approval).await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();

    let finished = setup
        .engine
        .decide(
            &report.workflow_id,
            ApprovalDecision::Reject {
                approver: "supervisor-7".into(),
                reason: "risk too high".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(finished.state, WorkflowState::Completed);
    assert_eq!(finished.status, Some(RunStatus::Rejected));
    assert!(finished.execution_steps.is_empty());

    // A second decision has nothing to act on.
    let err = setup
        .engine
        .decide(
            &finished.workflow_id,
            ApprovalDecision::Approve {
                approver: "manager-1".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not awaiting"));
}

#[tokio::test]
async fn decisions_require_a_parked_run() {
    let setup = build_engine(happy_path_stages).await;
    let report = setup
        .engine
        .start_and_run(SharedContext::new())
        .await
        .unwrap();
    assert_eq!(report.state, WorkflowState::Completed);

    let err = setup
        .engine
        .decide(
            &report.workflow_id,
            ApprovalDecision::Approve {
                approver: "supervisor-7".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not awaiting"));
}
