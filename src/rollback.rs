//! Reverse-order compensation of committed side effects.
//!
//! Every durable side effect applied during a run is recorded as a
//! [`CommittedAction`] at the moment it commits. When execution fails, or a
//! stage errors after at least one commit exists, the
//! [`RollbackCoordinator`] walks the commit list in exact reverse order and
//! dispatches each entry to the [`CompensationHandler`] registered for its
//! action type. One failed compensation never aborts the rest; every outcome
//! is recorded for the audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A durably applied side effect, recorded in commit order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommittedAction {
    /// Dispatch key for the compensating handler (e.g. `"REBOOK"`).
    pub action_type: String,
    /// Identifier of the entity the side effect touched.
    pub target_id: String,
    /// Whatever the compensating handler needs to reverse the effect.
    #[serde(default)]
    pub compensation: Value,
    pub committed_at: DateTime<Utc>,
}

impl CommittedAction {
    pub fn new(
        action_type: impl Into<String>,
        target_id: impl Into<String>,
        compensation: Value,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            target_id: target_id.into(),
            compensation,
            committed_at: Utc::now(),
        }
    }
}

/// Error raised by a compensating handler.
#[derive(Debug, Error, Diagnostic)]
#[error("compensation failed for {action_type}/{target_id}: {message}")]
#[diagnostic(code(recoflow::rollback::compensation))]
pub struct CompensationError {
    pub action_type: String,
    pub target_id: String,
    pub message: String,
}

impl CompensationError {
    pub fn new(action: &CommittedAction, message: impl Into<String>) -> Self {
        Self {
            action_type: action.action_type.clone(),
            target_id: action.target_id.clone(),
            message: message.into(),
        }
    }
}

/// Reverses one class of committed side effect (a booking commit compensates
/// with a cancellation, an item reassignment with a re-assignment back).
#[async_trait]
pub trait CompensationHandler: Send + Sync {
    async fn compensate(&self, action: &CommittedAction) -> Result<(), CompensationError>;
}

/// Outcome of one compensation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationStatus {
    Success,
    Failed,
}

/// Record of one compensation attempt, in processing (= reverse commit) order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub action: CommittedAction,
    pub status: CompensationStatus,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Walks the committed-action list in exact reverse commit order, dispatching
/// to per-type handlers.
#[derive(Default)]
pub struct RollbackCoordinator {
    handlers: FxHashMap<String, Arc<dyn CompensationHandler>>,
}

impl RollbackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the compensating handler for an action type, replacing any
    /// previous registration.
    pub fn register(
        &mut self,
        action_type: impl Into<String>,
        handler: Arc<dyn CompensationHandler>,
    ) {
        self.handlers.insert(action_type.into(), handler);
    }

    pub fn has_handler(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Compensate every committed action, most recent first.
    ///
    /// Each attempt records its own outcome; a failed or unhandled entry is
    /// recorded as `Failed` and processing continues. The returned records
    /// are in processing order (reverse of commit order).
    pub async fn rollback(&self, actions: &[CommittedAction]) -> Vec<CompensationRecord> {
        let mut records = Vec::with_capacity(actions.len());
        for action in actions.iter().rev() {
            let outcome = match self.handlers.get(&action.action_type) {
                Some(handler) => handler.compensate(action).await,
                None => Err(CompensationError::new(
                    action,
                    format!("no compensation handler for action type {}", action.action_type),
                )),
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(
                        action_type = %action.action_type,
                        target = %action.target_id,
                        "compensation succeeded"
                    );
                    records.push(CompensationRecord {
                        action: action.clone(),
                        status: CompensationStatus::Success,
                        error: None,
                        at: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        action_type = %action.action_type,
                        target = %action.target_id,
                        error = %e,
                        "compensation failed; continuing with remaining entries"
                    );
                    records.push(CompensationRecord {
                        action: action.clone(),
                        status: CompensationStatus::Failed,
                        error: Some(e.to_string()),
                        at: Utc::now(),
                    });
                }
            }
        }
        records
    }
}
