//! Stage processor contract.
//!
//! A [`StageProcessor`] is one of the six opaque units the engine drives:
//! Detect, AssessImpact, Plan, Approve, Execute, Notify. Each receives the
//! run's [`SharedContext`] by mutable reference, does its work, and returns.
//! Processors communicate business outcomes through the documented context
//! keys ([`crate::context::keys`]); a returned [`StageError`] is always fatal
//! to the run.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use recoflow::context::{SharedContext, keys};
//! use recoflow::stage::{StageContext, StageError, StageProcessor};
//! use serde_json::json;
//!
//! struct DetectStage;
//!
//! #[async_trait]
//! impl StageProcessor for DetectStage {
//!     async fn process(
//!         &self,
//!         context: &mut SharedContext,
//!         ctx: StageContext,
//!     ) -> Result<(), StageError> {
//!         ctx.emit("classification", "inspecting disruption event");
//!         let event = context
//!             .get("disruption_event")
//!             .ok_or(StageError::MissingInput { what: "disruption_event" })?
//!             .clone();
//!         context.set(keys::DISRUPTION_DETECTED, json!(event.get("event_type").is_some()));
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use thiserror::Error;

use crate::context::SharedContext;
use crate::event_bus::Event;
use crate::machine::WorkflowState;
use crate::rollback::CommittedAction;

/// Core trait for the six workflow stage processors.
///
/// Implementations may be arbitrarily non-deterministic (classifiers,
/// scorers, LLM calls); the engine's correctness depends only on the
/// documented context keys. A processor must not retain any reference to the
/// context after returning.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    async fn process(
        &self,
        context: &mut SharedContext,
        ctx: StageContext,
    ) -> Result<(), StageError>;
}

/// Shared, append-only commit log for one run.
///
/// Only the run's own task writes or reads it; the engine drains it into the
/// run record after each stage so commits are persisted with the checkpoint.
#[derive(Clone, Debug, Default)]
pub struct CommitLog {
    entries: Arc<Mutex<Vec<CommittedAction>>>,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a side effect at the moment it durably applies.
    pub fn record(&self, action: CommittedAction) {
        self.entries.lock().push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Move all recorded commits out, preserving commit order.
    pub fn drain(&self) -> Vec<CommittedAction> {
        std::mem::take(&mut *self.entries.lock())
    }
}

/// Execution context handed to a stage processor alongside the shared
/// context: identity, an event emitter, and the run's commit log.
#[derive(Clone, Debug)]
pub struct StageContext {
    pub workflow_id: String,
    pub stage: WorkflowState,
    /// Engine-configured bound on attempts for transiently failing work.
    pub retry_limit: u32,
    event_tx: flume::Sender<Event>,
    commits: CommitLog,
}

impl StageContext {
    pub fn new(
        workflow_id: impl Into<String>,
        stage: WorkflowState,
        event_tx: flume::Sender<Event>,
        commits: CommitLog,
        retry_limit: u32,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            stage,
            retry_limit,
            event_tx,
            commits,
        }
    }

    /// Emit a stage-scoped observability event. Best-effort: a disconnected
    /// bus is logged and otherwise ignored.
    pub fn emit(&self, scope: impl Into<String>, message: impl Into<String>) {
        let event = Event::stage(self.workflow_id.clone(), self.stage, scope, message);
        if self.event_tx.send(event).is_err() {
            tracing::debug!(
                workflow_id = %self.workflow_id,
                stage = %self.stage,
                "event bus unavailable; stage event dropped"
            );
        }
    }

    /// Record a committed side effect so it can be compensated on failure.
    ///
    /// Must be called at the moment the effect durably applies, not before.
    pub fn record_commit(&self, action: CommittedAction) {
        tracing::debug!(
            workflow_id = %self.workflow_id,
            action_type = %action.action_type,
            target = %action.target_id,
            "side effect committed"
        );
        self.commits.record(action);
    }
}

/// Fatal errors raised by stage processors.
///
/// Business outcomes (rejection, no scenario, pending approval) are not
/// errors: report them through context flags instead. Returning `Err` from
/// `process` always fails the run and triggers rollback when commits exist.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    /// Expected input data is missing from the shared context.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(recoflow::stage::missing_input),
        help("Check that the previous stage produced the required key.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(recoflow::stage::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(recoflow::stage::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(recoflow::stage::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// Catch-all for implementation-specific fatal failures.
    #[error("stage failed: {0}")]
    #[diagnostic(code(recoflow::stage::other))]
    Other(String),
}
