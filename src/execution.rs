//! Execution planning and ordered, atomic step execution.
//!
//! Before the Execute stage touches anything, the approved scenario is
//! expanded into an ordered plan: one capacity-validation step, one rebooking
//! step per affected item sorted by priority (`CRITICAL, HIGH, STANDARD,
//! LOW`, stable within a tier), and a final verification step. Steps run
//! strictly one at a time. A validation failure stops the plan before any
//! rebooking is attempted; individual rebooking failures are independent and
//! never abort the remaining items.
//!
//! The actual side effects live behind [`RecoveryActions`]; each successful
//! rebooking is recorded as a [`CommittedAction`] at the moment it applies so
//! the rollback coordinator can reverse it later.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::context::{SharedContext, keys};
use crate::machine::{approval_status, execution_status};
use crate::rollback::CommittedAction;
use crate::stage::{StageContext, StageError, StageProcessor};

/// Context key holding the items to rebook (array of [`AffectedItem`]).
pub const AFFECTED_ITEMS_KEY: &str = "affected_items";
/// Context key the Execute stage writes the serialized step list to.
pub const EXECUTION_STEPS_KEY: &str = "execution_steps";

/// Default bound on attempts for a transiently failing step.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Rebooking priority tiers, most urgent first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Standard,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Standard
    }
}

/// One item affected by the disruption, as the AssessImpact stage reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffectedItem {
    pub id: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub weight_kg: f64,
}

/// Lifecycle of one execution step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// What a step does when it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAction {
    ValidateCapacity {
        target_id: String,
        required_weight_kg: f64,
    },
    Rebook {
        item_id: String,
        target_id: String,
        priority: Priority,
    },
    VerifyCompletion {
        target_id: String,
        expected_items: usize,
    },
}

/// One entry in the ordered execution plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub sequence: u32,
    #[serde(flatten)]
    pub action: StepAction,
    pub status: StepStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionStep {
    fn new(sequence: u32, action: StepAction) -> Self {
        Self {
            sequence,
            action,
            status: StepStatus::Pending,
            attempts: 0,
            error: None,
        }
    }
}

/// Build the ordered plan for a target: validate, rebook by priority
/// (stable within a tier), verify.
pub fn build_plan(target_id: &str, items: &[AffectedItem]) -> Vec<ExecutionStep> {
    let mut plan = Vec::with_capacity(items.len() + 2);
    let required_weight_kg = items.iter().map(|i| i.weight_kg).sum();
    plan.push(ExecutionStep::new(
        1,
        StepAction::ValidateCapacity {
            target_id: target_id.to_string(),
            required_weight_kg,
        },
    ));

    let mut ordered: Vec<&AffectedItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.priority);

    for (offset, item) in ordered.iter().enumerate() {
        plan.push(ExecutionStep::new(
            offset as u32 + 2,
            StepAction::Rebook {
                item_id: item.id.clone(),
                target_id: target_id.to_string(),
                priority: item.priority,
            },
        ));
    }

    plan.push(ExecutionStep::new(
        items.len() as u32 + 2,
        StepAction::VerifyCompletion {
            target_id: target_id.to_string(),
            expected_items: items.len(),
        },
    ));
    plan
}

/// Error from a [`RecoveryActions`] call.
///
/// Transient errors are retried up to the executor's retry bound; permanent
/// errors fail the step immediately.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(recoflow::execution::action))]
pub struct ActionError {
    pub message: String,
    pub transient: bool,
}

impl ActionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// The side-effecting collaborator the Execute stage drives.
///
/// `rebook` returns the compensation payload needed to reverse the booking
/// (original assignment, booking reference, ...); the executor records it
/// with the commit.
#[async_trait]
pub trait RecoveryActions: Send + Sync {
    async fn validate_capacity(
        &self,
        target_id: &str,
        required_weight_kg: f64,
    ) -> Result<(), ActionError>;

    async fn rebook(&self, item_id: &str, target_id: &str) -> Result<Value, ActionError>;

    async fn verify_completion(
        &self,
        target_id: &str,
        rebooked: usize,
        expected: usize,
    ) -> Result<(), ActionError>;
}

/// Aggregate outcome of one plan execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// `COMPLETED`, `PARTIAL`, or `FAILED` (the documented context values).
    pub status: String,
    pub steps: Vec<ExecutionStep>,
    pub items_recovered: usize,
    pub items_failed: usize,
}

/// Runs a plan strictly in order, one step at a time, with bounded retries
/// for transient failures.
pub struct PlanExecutor {
    actions: Arc<dyn RecoveryActions>,
    retry_limit: u32,
}

impl PlanExecutor {
    pub fn new(actions: Arc<dyn RecoveryActions>, retry_limit: u32) -> Self {
        Self {
            actions,
            retry_limit: retry_limit.max(1),
        }
    }

    /// Execute the plan. `on_commit` is invoked at the moment each rebooking
    /// durably applies, in commit order.
    pub async fn run(
        &self,
        mut plan: Vec<ExecutionStep>,
        on_commit: &(dyn Fn(CommittedAction) + Send + Sync),
    ) -> ExecutionReport {
        let mut validation_failed = false;
        let mut recovered = 0usize;
        let mut failed = 0usize;

        for idx in 0..plan.len() {
            if validation_failed {
                break;
            }
            plan[idx].status = StepStatus::InProgress;
            let action = plan[idx].action.clone();
            let outcome = match &action {
                StepAction::ValidateCapacity {
                    target_id,
                    required_weight_kg,
                } => {
                    self.attempt(&mut plan[idx], || {
                        self.actions.validate_capacity(target_id, *required_weight_kg)
                    })
                    .await
                }
                StepAction::Rebook { item_id, target_id, .. } => {
                    let result = self
                        .attempt_value(&mut plan[idx], || self.actions.rebook(item_id, target_id))
                        .await;
                    match result {
                        Ok(compensation) => {
                            on_commit(CommittedAction::new("REBOOK", item_id.clone(), compensation));
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                StepAction::VerifyCompletion {
                    target_id,
                    expected_items,
                } => {
                    let completed_rebooks = plan
                        .iter()
                        .filter(|s| {
                            matches!(s.action, StepAction::Rebook { .. })
                                && s.status == StepStatus::Completed
                        })
                        .count();
                    self.attempt(&mut plan[idx], || {
                        self.actions
                            .verify_completion(target_id, completed_rebooks, *expected_items)
                    })
                    .await
                }
            };

            match outcome {
                Ok(()) => {
                    plan[idx].status = StepStatus::Completed;
                    if matches!(action, StepAction::Rebook { .. }) {
                        recovered += 1;
                    }
                }
                Err(e) => {
                    plan[idx].status = StepStatus::Failed;
                    plan[idx].error = Some(e.to_string());
                    match action {
                        StepAction::ValidateCapacity { .. } => {
                            // Without capacity nothing may be rebooked.
                            tracing::warn!(error = %e, "capacity validation failed; aborting plan");
                            validation_failed = true;
                        }
                        StepAction::Rebook { ref item_id, .. } => {
                            tracing::warn!(item = %item_id, error = %e, "rebooking failed; continuing");
                            failed += 1;
                        }
                        StepAction::VerifyCompletion { .. } => {
                            tracing::warn!(error = %e, "completion verification failed");
                        }
                    }
                }
            }
        }

        let status = if validation_failed {
            execution_status::FAILED
        } else if plan.iter().all(|s| s.status == StepStatus::Completed) {
            execution_status::COMPLETED
        } else {
            execution_status::PARTIAL
        };

        ExecutionReport {
            status: status.to_string(),
            steps: plan,
            items_recovered: recovered,
            items_failed: failed,
        }
    }

    async fn attempt<'a, F, Fut>(&self, step: &mut ExecutionStep, op: F) -> Result<(), ActionError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), ActionError>> + 'a,
    {
        self.attempt_value(step, || {
            let fut = op();
            async move { fut.await.map(|()| Value::Null) }
        })
        .await
        .map(|_| ())
    }

    async fn attempt_value<'a, F, Fut>(
        &self,
        step: &mut ExecutionStep,
        op: F,
    ) -> Result<Value, ActionError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Value, ActionError>> + 'a,
    {
        loop {
            step.attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.transient && step.attempts < self.retry_limit => {
                    tracing::debug!(
                        sequence = step.sequence,
                        attempt = step.attempts,
                        error = %e,
                        "transient step failure; retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Standard Execute stage processor.
///
/// Builds the plan from `recommended_scenario` and `affected_items`, drives
/// [`RecoveryActions`] through a [`PlanExecutor`], records commits through
/// the stage context, and writes `execution_status`, per-item counts, and the
/// serialized step list back into the shared context.
///
/// The retry bound comes from the engine config via the stage context unless
/// [`with_retry_limit`](Self::with_retry_limit) pins one explicitly.
pub struct ExecuteStage {
    actions: Arc<dyn RecoveryActions>,
    retry_override: Option<u32>,
}

impl ExecuteStage {
    pub fn new(actions: Arc<dyn RecoveryActions>) -> Self {
        Self {
            actions,
            retry_override: None,
        }
    }

    pub fn with_retry_limit(actions: Arc<dyn RecoveryActions>, retry_limit: u32) -> Self {
        Self {
            actions,
            retry_override: Some(retry_limit),
        }
    }
}

#[async_trait]
impl StageProcessor for ExecuteStage {
    async fn process(
        &self,
        context: &mut SharedContext,
        ctx: StageContext,
    ) -> Result<(), StageError> {
        match context.get_str(keys::APPROVAL_STATUS) {
            Some(approval_status::APPROVED) | Some(approval_status::AUTO_APPROVED) => {}
            other => {
                return Err(StageError::ValidationFailed(format!(
                    "execution requires an approved scenario, approval_status is {other:?}"
                )));
            }
        }

        let scenario = context
            .get(keys::RECOMMENDED_SCENARIO)
            .cloned()
            .ok_or(StageError::MissingInput {
                what: keys::RECOMMENDED_SCENARIO,
            })?;
        let target_id = scenario
            .get("target_id")
            .or_else(|| scenario.get("target_flight_id"))
            .and_then(Value::as_str)
            .ok_or(StageError::MissingInput { what: "target_id" })?
            .to_string();

        let items: Vec<AffectedItem> = match context.get(AFFECTED_ITEMS_KEY) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };

        let plan = build_plan(&target_id, &items);
        ctx.emit(
            "execution_plan",
            format!("{} steps planned for target {target_id}", plan.len()),
        );

        let retry_limit = self.retry_override.unwrap_or(ctx.retry_limit);
        let executor = PlanExecutor::new(Arc::clone(&self.actions), retry_limit);
        let report = executor
            .run(plan, &|action| ctx.record_commit(action))
            .await;

        ctx.emit(
            "execution_complete",
            format!(
                "status={} recovered={} failed={}",
                report.status, report.items_recovered, report.items_failed
            ),
        );

        context.set(keys::EXECUTION_STATUS, json!(report.status));
        context.set("items_recovered", json!(report.items_recovered));
        context.set("items_failed", json!(report.items_failed));
        context.set(EXECUTION_STEPS_KEY, serde_json::to_value(&report.steps)?);
        context.record(
            "execute-stage",
            "execution_completed",
            json!({
                "status": report.status,
                "recovered": report.items_recovered,
                "failed": report.items_failed,
            }),
        );
        Ok(())
    }
}
