/*!
Persistence primitives for serializing checkpoints (used by the SQLite
store and any future durable backends).

Design goals:
- Explicit serde-friendly structs decoupled from in-memory types.
- Conversion logic localized in From / TryFrom impls so backend code
  stays lean and declarative.

This module performs no I/O; it is pure data transformation.
*/

use chrono::Utc;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::SharedContext;
use crate::machine::WorkflowState;
use crate::rollback::CommittedAction;
use crate::runtime::checkpointer::Checkpoint;

/// Persisted shape of one checkpoint row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub workflow_id: String,
    pub seq: u64,
    /// Stage encoded via [`WorkflowState::encode`].
    pub stage: String,
    pub context: SharedContext,
    #[serde(default)]
    pub committed_actions: Vec<CommittedAction>,
    /// RFC3339 creation time (keeps `chrono::DateTime` out of the row shape).
    pub created_at: String,
}

/// Conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("unknown workflow state encoding: {0}")]
    #[diagnostic(
        code(recoflow::persistence::unknown_state),
        help("The stage column must hold a value produced by WorkflowState::encode.")
    )]
    UnknownState(String),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(code(recoflow::persistence::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for PersistenceError {
    fn from(source: serde_json::Error) -> Self {
        PersistenceError::Serde { source }
    }
}

impl PersistedCheckpoint {
    pub fn to_json_string(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            workflow_id: cp.workflow_id.clone(),
            seq: cp.seq,
            stage: cp.stage.encode().to_string(),
            context: cp.context.clone(),
            committed_actions: cp.committed_actions.clone(),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(p: PersistedCheckpoint) -> Result<Self, PersistenceError> {
        let stage = WorkflowState::decode(&p.stage)
            .ok_or_else(|| PersistenceError::UnknownState(p.stage.clone()))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Checkpoint {
            workflow_id: p.workflow_id,
            seq: p.seq,
            stage,
            context: p.context,
            committed_actions: p.committed_actions,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn checkpoint_roundtrip() {
        let mut context = SharedContext::new();
        context.set("disruption_detected", json!(true));
        let cp = Checkpoint {
            workflow_id: "wf-1".into(),
            seq: 3,
            stage: WorkflowState::Planning,
            context,
            committed_actions: vec![CommittedAction::new("REBOOK", "item-1", Value::Null)],
            created_at: Utc::now(),
        };

        let persisted = PersistedCheckpoint::from(&cp);
        let json = persisted.to_json_string().unwrap();
        let restored = Checkpoint::try_from(PersistedCheckpoint::from_json_str(&json).unwrap()).unwrap();

        assert_eq!(restored.workflow_id, cp.workflow_id);
        assert_eq!(restored.seq, 3);
        assert_eq!(restored.stage, WorkflowState::Planning);
        assert_eq!(restored.context, cp.context);
        assert_eq!(restored.committed_actions.len(), 1);
    }

    #[test]
    fn unknown_stage_encoding_is_rejected() {
        let persisted = PersistedCheckpoint {
            workflow_id: "wf".into(),
            seq: 1,
            stage: "BOGUS".into(),
            context: SharedContext::new(),
            committed_actions: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        };
        assert!(matches!(
            Checkpoint::try_from(persisted),
            Err(PersistenceError::UnknownState(_))
        ));
    }
}
