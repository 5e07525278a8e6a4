//! The workflow engine: drives stage processors through the state machine,
//! checkpoints after every stage, and owns rollback and escalation.
//!
//! One engine instance serves many concurrent runs. The registry maps
//! workflow ids to run records behind per-run async mutexes; the registry
//! lock itself is only ever held for map access, never across an await, so
//! one slow stage cannot stall unrelated runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::context::{SharedContext, keys};
use crate::escalation::{
    ApprovalLevel, ApprovalTicket, Escalation, TicketStatus, escalate,
};
use crate::event_bus::{Event, EventBus};
use crate::execution::{EXECUTION_STEPS_KEY, StepAction, StepStatus};
use crate::machine::{
    RunStatus, Transition, WorkflowState, approval_status, evaluate, normalize_planning,
};
use crate::rollback::{CompensationStatus, RollbackCoordinator};
use crate::runtime::checkpointer::{
    Checkpoint, CheckpointError, CheckpointStore, CheckpointStoreType, InMemoryCheckpointStore,
};
use crate::runtime::config::EngineConfig;
use crate::runtime::run::{RunReport, WorkflowRun};
use crate::stage::{CommitLog, StageContext, StageProcessor};

/// A human decision on a parked approval.
#[derive(Clone, Debug)]
pub enum ApprovalDecision {
    Approve { approver: String },
    Reject { approver: String, reason: String },
}

/// One run touched by an escalation sweep.
#[derive(Clone, Debug)]
pub struct EscalationSweep {
    pub workflow_id: String,
    pub escalation: Escalation,
}

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("workflow not found: {workflow_id}")]
    #[diagnostic(code(recoflow::engine::run_not_found))]
    RunNotFound { workflow_id: String },

    #[error("workflow already exists: {workflow_id}")]
    #[diagnostic(code(recoflow::engine::duplicate_run))]
    DuplicateRun { workflow_id: String },

    #[error("workflow {workflow_id} is not awaiting an approval decision")]
    #[diagnostic(
        code(recoflow::engine::not_paused),
        help("Decisions only apply to runs parked at the approval stage.")
    )]
    RunNotPaused { workflow_id: String },

    #[error(transparent)]
    #[diagnostic(code(recoflow::engine::checkpoint))]
    Checkpoint(#[from] CheckpointError),
}

/// Builder for a [`WorkflowEngine`].
///
/// Stages with no registered processor are skipped at run time; compensation
/// handlers and config are optional.
#[derive(Default)]
pub struct WorkflowEngineBuilder {
    stages: FxHashMap<WorkflowState, Arc<dyn StageProcessor>>,
    rollback: RollbackCoordinator,
    config: EngineConfig,
    store: Option<Arc<dyn CheckpointStore>>,
    event_bus: Option<EventBus>,
}

impl WorkflowEngineBuilder {
    #[must_use]
    pub fn stage(mut self, stage: WorkflowState, processor: Arc<dyn StageProcessor>) -> Self {
        debug_assert!(stage.is_stage(), "{stage} is not a processing stage");
        self.stages.insert(stage, processor);
        self
    }

    /// Register the compensation handler for an action type.
    #[must_use]
    pub fn compensation(
        mut self,
        action_type: impl Into<String>,
        handler: Arc<dyn crate::rollback::CompensationHandler>,
    ) -> Self {
        self.rollback.register(action_type, handler);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the checkpoint store selected by the config.
    #[must_use]
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the event bus built from the config.
    #[must_use]
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub async fn build(self) -> Result<WorkflowEngine, EngineError> {
        let store = match self.store {
            Some(store) => store,
            None => Self::create_store(&self.config).await?,
        };
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| self.config.event_bus.build_event_bus());
        event_bus.listen_for_events();
        let event_tx = event_bus.get_sender();

        Ok(WorkflowEngine {
            stages: self.stages,
            rollback: self.rollback,
            store,
            config: self.config,
            event_bus,
            event_tx,
            runs: RwLock::new(FxHashMap::default()),
        })
    }

    async fn create_store(config: &EngineConfig) -> Result<Arc<dyn CheckpointStore>, EngineError> {
        match config.checkpoint_store {
            CheckpointStoreType::InMemory => Ok(Arc::new(InMemoryCheckpointStore::new())),
            #[cfg(feature = "sqlite")]
            CheckpointStoreType::Sqlite => {
                let db_url = std::env::var("RECOFLOW_SQLITE_URL")
                    .ok()
                    .or_else(|| {
                        config
                            .sqlite_db_name
                            .as_ref()
                            .map(|name| format!("sqlite://{name}"))
                    })
                    .unwrap_or_else(|| "sqlite://recoflow.db".to_string());
                // Ensure the sqlite file exists before sqlx connects.
                if let Some(path) = db_url.strip_prefix("sqlite://") {
                    let path = path.trim();
                    if !path.is_empty() {
                        let p = std::path::Path::new(path);
                        if let Some(parent) = p.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if !p.exists() {
                            let _ = std::fs::File::create_new(p);
                        }
                    }
                }
                let store =
                    crate::runtime::checkpointer_sqlite::SqliteCheckpointStore::connect(&db_url)
                        .await?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Orchestrator for disruption-recovery workflow runs.
pub struct WorkflowEngine {
    stages: FxHashMap<WorkflowState, Arc<dyn StageProcessor>>,
    rollback: RollbackCoordinator,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    event_bus: EventBus,
    event_tx: flume::Sender<Event>,
    runs: RwLock<FxHashMap<String, Arc<Mutex<WorkflowRun>>>>,
}

impl WorkflowEngine {
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a new run in `DETECTING` without driving it yet.
    ///
    /// A `None` id gets a generated UUID. The id must not collide with any
    /// registered run.
    #[instrument(skip(self, context), err)]
    pub fn start(
        &self,
        workflow_id: Option<String>,
        context: SharedContext,
    ) -> Result<String, EngineError> {
        let workflow_id = workflow_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        {
            let mut runs = self.runs.write();
            if runs.contains_key(&workflow_id) {
                return Err(EngineError::DuplicateRun { workflow_id });
            }
            runs.insert(
                workflow_id.clone(),
                Arc::new(Mutex::new(WorkflowRun::new(workflow_id.clone(), context))),
            );
        }
        self.emit(Event::transition(
            workflow_id.clone(),
            WorkflowState::Detecting,
            "workflow started",
        ));
        Ok(workflow_id)
    }

    /// Drive a run until it terminates or parks for approval.
    #[instrument(skip(self), err)]
    pub async fn run(&self, workflow_id: &str) -> Result<RunReport, EngineError> {
        let handle = self.registered(workflow_id)?;
        let mut run = handle.lock().await;
        if run.state.is_terminal() {
            return Ok(run.report());
        }
        self.drive(&mut run).await
    }

    /// Convenience: [`start`](Self::start) then [`run`](Self::run).
    pub async fn start_and_run(&self, context: SharedContext) -> Result<RunReport, EngineError> {
        let workflow_id = self.start(None, context)?;
        self.run(&workflow_id).await
    }

    /// Apply a human approval decision to a parked run and continue it.
    ///
    /// A rejection is terminal: the run completes with status `REJECTED` and
    /// never returns to planning.
    #[instrument(skip(self, decision), err)]
    pub async fn decide(
        &self,
        workflow_id: &str,
        decision: ApprovalDecision,
    ) -> Result<RunReport, EngineError> {
        let (handle, _) = self.hydrate(workflow_id).await?;
        let mut run = handle.lock().await;
        if !run.is_paused() {
            return Err(EngineError::RunNotPaused {
                workflow_id: workflow_id.to_string(),
            });
        }

        match decision {
            ApprovalDecision::Approve { approver } => {
                run.context
                    .set(keys::APPROVAL_STATUS, json!(approval_status::APPROVED));
                run.context.record(
                    approver.clone(),
                    "approval_granted",
                    json!({ "approver": approver }),
                );
                if let Some(ticket) = &mut run.approval_ticket {
                    ticket.status = TicketStatus::Approved;
                }
            }
            ApprovalDecision::Reject { approver, reason } => {
                run.context
                    .set(keys::APPROVAL_STATUS, json!(approval_status::REJECTED));
                run.context.record(
                    approver.clone(),
                    "approval_rejected",
                    json!({ "approver": approver, "reason": reason }),
                );
                if let Some(ticket) = &mut run.approval_ticket {
                    ticket.status = TicketStatus::Rejected;
                }
            }
        }
        // The decision must survive a restart that happens before the next
        // stage checkpoints, or rehydration would re-park the run as pending.
        self.checkpoint(&mut run, WorkflowState::Approving).await?;
        run.status = None;
        run.reason = None;

        // The Approve stage already ran; re-evaluate its outcome with the
        // decision injected instead of running the processor again.
        let transition = evaluate(WorkflowState::Approving, &run.context);
        self.apply_transition(&mut run, WorkflowState::Approving, transition)
            .await;
        self.drive(&mut run).await
    }

    /// Continue a run from its latest checkpoint, e.g. after a restart.
    ///
    /// The checkpointed stage is never re-run; its recorded outcome is
    /// re-evaluated and the run proceeds from there. A run still awaiting
    /// approval stays parked.
    #[instrument(skip(self), err)]
    pub async fn resume(&self, workflow_id: &str) -> Result<RunReport, EngineError> {
        let (handle, rehydrated) = self.hydrate(workflow_id).await?;
        let mut run = handle.lock().await;
        if run.state.is_terminal() || run.is_paused() {
            return Ok(run.report());
        }
        if rehydrated {
            let completed = run.state;
            let transition = evaluate(completed, &run.context);
            self.apply_transition(&mut run, completed, transition).await;
        }
        self.drive(&mut run).await
    }

    /// Restore the run to the checkpoint taken after `from_stage`, then
    /// re-execute every stage strictly after it, writing fresh checkpoints as
    /// the run advances again.
    ///
    /// The restored context replaces the run's in-memory state; new
    /// checkpoints extend the same monotonic sequence. Stage processors may
    /// be non-deterministic, but with unchanged external inputs the
    /// transition rule re-derives the same state path.
    #[instrument(skip(self), err)]
    pub async fn replay(
        &self,
        workflow_id: &str,
        from_stage: WorkflowState,
    ) -> Result<RunReport, EngineError> {
        let checkpoint = self
            .store
            .load(workflow_id, from_stage)
            .await?
            .ok_or_else(|| CheckpointError::NotFound {
                workflow_id: workflow_id.to_string(),
                stage: from_stage.encode().to_string(),
            })?;
        let latest_seq = self
            .store
            .load_latest(workflow_id)
            .await?
            .map_or(checkpoint.seq, |cp| cp.seq);

        let handle = {
            let mut runs = self.runs.write();
            runs.entry(workflow_id.to_string())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(WorkflowRun::new(workflow_id, SharedContext::new())))
                })
                .clone()
        };
        let mut run = handle.lock().await;
        *run = WorkflowRun::new(workflow_id, checkpoint.context);
        run.state = from_stage;
        run.checkpoint_seq = latest_seq;
        run.committed_actions = checkpoint.committed_actions;
        if let Some(steps) = run.context.get(EXECUTION_STEPS_KEY) {
            run.execution_steps = serde_json::from_value(steps.clone()).unwrap_or_default();
        }
        tracing::info!(
            workflow_id,
            from = %from_stage,
            seq = run.checkpoint_seq,
            "replaying stages after checkpoint"
        );

        let transition = evaluate(from_stage, &run.context);
        self.apply_transition(&mut run, from_stage, transition).await;
        self.drive(&mut run).await
    }

    /// Current snapshot of a run (rehydrating from checkpoints if needed).
    pub async fn status(&self, workflow_id: &str) -> Result<RunReport, EngineError> {
        let (handle, _) = self.hydrate(workflow_id).await?;
        let run = handle.lock().await;
        Ok(run.report())
    }

    /// Every workflow with at least one checkpoint.
    pub async fn list_workflows(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list_workflows().await?)
    }

    /// Advance every expired pending approval exactly one level.
    ///
    /// Explicit clock injection keeps the escalation rule testable; the
    /// background [`EscalationTimer`](crate::escalation::EscalationTimer)
    /// passes `Utc::now()`.
    pub async fn sweep_escalations(&self, now: DateTime<Utc>) -> Vec<EscalationSweep> {
        // A parked run may exist only in the checkpoint store after a
        // restart; pull those into the registry so they escalate too.
        match self.store.list_workflows().await {
            Ok(ids) => {
                for id in ids {
                    if self.runs.read().contains_key(&id) {
                        continue;
                    }
                    if let Err(e) = self.hydrate(&id).await {
                        tracing::warn!(
                            workflow_id = %id,
                            error = %e,
                            "could not rehydrate run for escalation sweep"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not list workflows for escalation sweep");
            }
        }

        let handles: Vec<Arc<Mutex<WorkflowRun>>> = self.runs.read().values().cloned().collect();
        let mut outcomes = Vec::new();

        for handle in handles {
            let mut run = handle.lock().await;
            if !run.is_paused() {
                continue;
            }
            let Some(ticket) = run.approval_ticket.clone() else {
                continue;
            };
            if !ticket.is_expired(now) {
                continue;
            }

            let escalation = escalate(&ticket, now, &self.config.escalation);
            match &escalation {
                Escalation::Advanced { from, to, ticket: next } => {
                    tracing::info!(
                        workflow_id = %run.workflow_id,
                        from = %from,
                        to = %to,
                        "approval escalated on timeout"
                    );
                    run.context.record(
                        "engine",
                        "approval_escalated",
                        json!({ "from": from.as_str(), "to": to.as_str() }),
                    );
                    run.approval_ticket = Some(next.clone());
                    self.emit(Event::stage(
                        run.workflow_id.clone(),
                        WorkflowState::Approving,
                        "escalation",
                        format!("approval escalated from {from} to {to}"),
                    ));
                }
                Escalation::Exhausted => {
                    let level = ticket.level;
                    run.approval_ticket = Some(ApprovalTicket {
                        status: TicketStatus::Timeout,
                        ..ticket
                    });
                    run.context.record(
                        "engine",
                        "approval_timeout_exhausted",
                        json!({ "level": level.as_str() }),
                    );
                    self.finish(
                        &mut run,
                        WorkflowState::Failed,
                        RunStatus::Failed,
                        format!("approval timed out at {level} with no higher authority"),
                    );
                }
            }
            outcomes.push(EscalationSweep {
                workflow_id: run.workflow_id.clone(),
                escalation,
            });
        }
        outcomes
    }

    /// Spawn the background escalation timer at the configured sweep
    /// interval.
    pub fn spawn_escalation_timer(self: &Arc<Self>) -> crate::escalation::EscalationTimer {
        crate::escalation::EscalationTimer::spawn(
            Arc::clone(self),
            self.config.escalation_sweep_interval,
        )
    }

    /// Stop the event bus listener. Runs in flight are unaffected; further
    /// events are dropped.
    pub async fn shutdown(&self) {
        self.event_bus.stop_listener().await;
    }

    fn registered(&self, workflow_id: &str) -> Result<Arc<Mutex<WorkflowRun>>, EngineError> {
        self.runs
            .read()
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::RunNotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    /// Look up a run, falling back to the checkpoint store. The second value
    /// is `true` when the run was rebuilt from a checkpoint.
    async fn hydrate(
        &self,
        workflow_id: &str,
    ) -> Result<(Arc<Mutex<WorkflowRun>>, bool), EngineError> {
        if let Some(handle) = self.runs.read().get(workflow_id).cloned() {
            return Ok((handle, false));
        }

        let checkpoint = self.store.load_latest(workflow_id).await?.ok_or_else(|| {
            EngineError::RunNotFound {
                workflow_id: workflow_id.to_string(),
            }
        })?;

        let mut run = WorkflowRun::new(workflow_id, checkpoint.context);
        run.state = checkpoint.stage;
        run.checkpoint_seq = checkpoint.seq;
        run.committed_actions = checkpoint.committed_actions;
        if let Some(steps) = run.context.get(EXECUTION_STEPS_KEY) {
            run.execution_steps = serde_json::from_value(steps.clone()).unwrap_or_default();
        }
        if checkpoint.stage == WorkflowState::Approving
            && run.context.get_str(keys::APPROVAL_STATUS) == Some(approval_status::PENDING)
        {
            run.status = Some(RunStatus::PendingApproval);
            run.reason = Some("awaiting approval decision".to_string());
            run.approval_ticket = self.open_ticket(&run.context);
        }
        tracing::info!(
            workflow_id,
            stage = %run.state,
            seq = run.checkpoint_seq,
            "run rehydrated from checkpoint"
        );

        let handle = {
            let mut runs = self.runs.write();
            runs.entry(workflow_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(run)))
                .clone()
        };
        Ok((handle, true))
    }

    /// The stage loop: process, drain commits, checkpoint, transition.
    async fn drive(&self, run: &mut WorkflowRun) -> Result<RunReport, EngineError> {
        while run.state.is_stage() && !run.is_paused() {
            let stage = run.state;
            let Some(processor) = self.stages.get(&stage).cloned() else {
                // Unmapped stages are skipped outright, without a checkpoint.
                tracing::debug!(workflow_id = %run.workflow_id, stage = %stage, "no processor mapped; skipping stage");
                let next = stage.next_in_sequence();
                if next.is_stage() {
                    run.transition_to(next, format!("{stage} skipped, no processor mapped"));
                    self.emit(Event::transition(
                        run.workflow_id.clone(),
                        next,
                        format!("{stage} skipped, no processor mapped"),
                    ));
                } else {
                    self.finish(
                        run,
                        WorkflowState::Completed,
                        RunStatus::Completed,
                        "recovery workflow completed".to_string(),
                    );
                }
                continue;
            };

            let commits = CommitLog::new();
            let stage_ctx = StageContext::new(
                run.workflow_id.clone(),
                stage,
                self.event_tx.clone(),
                commits.clone(),
                self.config.retry_limit,
            );
            tracing::debug!(workflow_id = %run.workflow_id, stage = %stage, "running stage");
            let result = processor.process(&mut run.context, stage_ctx).await;
            run.committed_actions.append(&mut commits.drain());

            if let Err(stage_err) = result {
                self.fail_run(run, stage, stage_err.to_string()).await;
                break;
            }

            if stage == WorkflowState::Planning {
                normalize_planning(&mut run.context);
            }
            if stage == WorkflowState::Executing
                && let Some(steps) = run.context.get(EXECUTION_STEPS_KEY)
            {
                run.execution_steps = serde_json::from_value(steps.clone()).unwrap_or_default();
            }

            if let Err(e) = self.checkpoint(run, stage).await {
                tracing::error!(
                    workflow_id = %run.workflow_id,
                    stage = %stage,
                    error = %e,
                    "checkpoint save failed; refusing to advance"
                );
                self.fail_run(run, stage, format!("checkpoint not persisted: {e}"))
                    .await;
                break;
            }
            let transition = evaluate(stage, &run.context);
            self.apply_transition(run, stage, transition).await;
        }
        Ok(run.report())
    }

    async fn apply_transition(
        &self,
        run: &mut WorkflowRun,
        completed: WorkflowState,
        transition: Transition,
    ) {
        match transition {
            Transition::Advance(next) => {
                run.transition_to(next, format!("{completed} complete"));
                self.emit(Event::transition(
                    run.workflow_id.clone(),
                    next,
                    format!("{completed} complete"),
                ));
            }
            Transition::Pause => {
                run.status = Some(RunStatus::PendingApproval);
                run.reason = Some("awaiting approval decision".to_string());
                if run
                    .approval_ticket
                    .as_ref()
                    .is_none_or(|t| t.status != TicketStatus::Pending)
                {
                    run.approval_ticket = self.open_ticket(&run.context);
                }
                self.emit(Event::transition(
                    run.workflow_id.clone(),
                    WorkflowState::Approving,
                    "paused pending approval",
                ));
            }
            Transition::Complete { status, reason } => {
                self.finish(run, WorkflowState::Completed, status, reason);
            }
            Transition::Escalate { reason } => {
                self.finish(
                    run,
                    WorkflowState::Escalated,
                    RunStatus::EscalatedNoOptions,
                    reason,
                );
            }
            Transition::Fail { reason } => {
                self.finish(run, WorkflowState::Failed, RunStatus::Failed, reason);
            }
            Transition::RollBack { reason } => {
                self.roll_back(run, reason).await;
            }
        }
    }

    /// Compensate every committed side effect in reverse order, then
    /// terminate in `ROLLED_BACK`.
    async fn roll_back(&self, run: &mut WorkflowRun, reason: String) {
        tracing::warn!(
            workflow_id = %run.workflow_id,
            commits = run.committed_actions.len(),
            %reason,
            "rolling back committed side effects"
        );
        let records = self.rollback.rollback(&run.committed_actions).await;

        // Reflect successful compensations back onto the plan steps.
        for record in &records {
            if record.status != CompensationStatus::Success {
                continue;
            }
            for step in &mut run.execution_steps {
                if step.status == StepStatus::Completed
                    && matches!(&step.action, StepAction::Rebook { item_id, .. }
                        if *item_id == record.action.target_id)
                {
                    step.status = StepStatus::RolledBack;
                }
            }
        }
        let failed = records
            .iter()
            .filter(|r| r.status == CompensationStatus::Failed)
            .count();
        run.context.record(
            "engine",
            "rollback_completed",
            json!({ "compensated": records.len() - failed, "failed": failed }),
        );
        run.compensation_records = records;
        self.finish(run, WorkflowState::RolledBack, RunStatus::RolledBack, reason);
    }

    async fn fail_run(&self, run: &mut WorkflowRun, stage: WorkflowState, message: String) {
        let reason = format!("stage {stage} failed: {message}");
        if run.committed_actions.is_empty() {
            self.finish(run, WorkflowState::Failed, RunStatus::Failed, reason);
        } else {
            self.roll_back(run, reason).await;
        }
    }

    fn finish(&self, run: &mut WorkflowRun, state: WorkflowState, status: RunStatus, reason: String) {
        run.transition_to(state, reason.clone());
        run.status = Some(status);
        run.reason = Some(reason.clone());
        self.emit(Event::transition(run.workflow_id.clone(), state, reason));
        tracing::info!(
            workflow_id = %run.workflow_id,
            state = %state,
            status = %status,
            "run finished"
        );
    }

    fn open_ticket(&self, context: &SharedContext) -> Option<ApprovalTicket> {
        let level = context
            .get_str(keys::REQUIRED_APPROVAL_LEVEL)
            .and_then(ApprovalLevel::parse)
            .filter(|l| *l != ApprovalLevel::Auto)
            .unwrap_or(ApprovalLevel::Supervisor);
        ApprovalTicket::open(level, Utc::now(), &self.config.escalation)
    }

    /// Persist a checkpoint for the stage that just completed. The next stage
    /// must not start before this one's checkpoint is durably written, so a
    /// save failure is fatal to the run.
    async fn checkpoint(
        &self,
        run: &mut WorkflowRun,
        stage: WorkflowState,
    ) -> Result<(), CheckpointError> {
        let seq = run.checkpoint_seq + 1;
        self.store.save(Checkpoint::from_run(run, stage, seq)).await?;
        run.checkpoint_seq = seq;
        Ok(())
    }

    fn emit(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("event bus unavailable; engine event dropped");
        }
    }
}
