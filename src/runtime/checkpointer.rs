//! Pluggable checkpoint persistence.
//!
//! The engine writes one [`Checkpoint`] after every completed stage; a crash
//! therefore re-runs at most one stage. A checkpoint is a complete restore
//! point: the context snapshot plus every committed side effect so far, so a
//! process restart can still roll back correctly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::context::SharedContext;
use crate::machine::WorkflowState;
use crate::rollback::CommittedAction;
use crate::runtime::run::WorkflowRun;

/// Restore point captured after one stage completed.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub workflow_id: String,
    /// Monotonically increasing per workflow; gaps never occur.
    pub seq: u64,
    /// The stage that had just completed when this checkpoint was taken.
    pub stage: WorkflowState,
    pub context: SharedContext,
    /// Commit-ordered side effects as of this point.
    pub committed_actions: Vec<CommittedAction>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Capture a checkpoint for the stage the run just completed.
    pub fn from_run(run: &WorkflowRun, stage: WorkflowState, seq: u64) -> Self {
        Self {
            workflow_id: run.workflow_id.clone(),
            seq,
            stage,
            context: run.context.snapshot(),
            committed_actions: run.committed_actions.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Which persistence backend the engine should use.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CheckpointStoreType {
    #[default]
    InMemory,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("no checkpoint for workflow {workflow_id} at stage {stage}")]
    #[diagnostic(code(recoflow::checkpoint::not_found))]
    NotFound { workflow_id: String, stage: String },

    #[error("checkpoint serialization failed: {source}")]
    #[diagnostic(code(recoflow::checkpoint::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint backend error: {message}")]
    #[diagnostic(
        code(recoflow::checkpoint::backend),
        help("Check connectivity and schema of the configured persistence backend.")
    )]
    Backend { message: String },
}

impl From<crate::runtime::persistence::PersistenceError> for CheckpointError {
    fn from(e: crate::runtime::persistence::PersistenceError) -> Self {
        use crate::runtime::persistence::PersistenceError;
        match e {
            PersistenceError::Serde { source } => CheckpointError::Serde { source },
            PersistenceError::UnknownState(s) => CheckpointError::Backend {
                message: format!("unknown workflow state encoding: {s}"),
            },
        }
    }
}

/// Trait for pluggable checkpoint persistence backends.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint. Saving is atomic per checkpoint: the context and
    /// committed-action list land together or not at all.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// The most recent checkpoint taken at the given stage, if any.
    async fn load(
        &self,
        workflow_id: &str,
        stage: WorkflowState,
    ) -> Result<Option<Checkpoint>, CheckpointError>;

    /// The checkpoint with the highest sequence number, if any.
    async fn load_latest(&self, workflow_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// All checkpoints for a workflow in sequence order.
    async fn list_checkpoints(&self, workflow_id: &str)
    -> Result<Vec<Checkpoint>, CheckpointError>;

    /// Every workflow id with at least one checkpoint.
    async fn list_workflows(&self) -> Result<Vec<String>, CheckpointError>;
}

/// Volatile store for tests and development.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .write()
            .entry(checkpoint.workflow_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load(
        &self,
        workflow_id: &str,
        stage: WorkflowState,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .checkpoints
            .read()
            .get(workflow_id)
            .and_then(|cps| cps.iter().rev().find(|cp| cp.stage == stage))
            .cloned())
    }

    async fn load_latest(&self, workflow_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .checkpoints
            .read()
            .get(workflow_id)
            .and_then(|cps| cps.iter().max_by_key(|cp| cp.seq))
            .cloned())
    }

    async fn list_checkpoints(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut cps = self
            .checkpoints
            .read()
            .get(workflow_id)
            .cloned()
            .unwrap_or_default();
        cps.sort_by_key(|cp| cp.seq);
        Ok(cps)
    }

    async fn list_workflows(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.checkpoints.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
