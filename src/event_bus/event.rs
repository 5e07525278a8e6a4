use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::machine::WorkflowState;

/// Events emitted by the engine and by stage processors.
///
/// Transition events are the notification contract of the orchestrator: one
/// `{workflow_id, state, message}` record per state transition, delivered
/// fire-and-forget to whatever sinks are attached. Stage and diagnostic
/// events exist for observability and never influence control flow.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Transition(TransitionEvent),
    Stage(StageEvent),
    Diagnostic(DiagnosticEvent),
}

/// Emitted by the engine on every workflow state transition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransitionEvent {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Emitted by a stage processor through its [`StageContext`](crate::stage::StageContext).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StageEvent {
    pub workflow_id: String,
    pub stage: WorkflowState,
    pub scope: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Free-form engine diagnostics (stream termination, sink errors, ...).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

impl Event {
    pub fn transition(
        workflow_id: impl Into<String>,
        state: WorkflowState,
        message: impl Into<String>,
    ) -> Self {
        Event::Transition(TransitionEvent {
            workflow_id: workflow_id.into(),
            state,
            message: message.into(),
            at: Utc::now(),
        })
    }

    pub fn stage(
        workflow_id: impl Into<String>,
        stage: WorkflowState,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Stage(StageEvent {
            workflow_id: workflow_id.into(),
            stage,
            scope: scope.into(),
            message: message.into(),
            at: Utc::now(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Event::Transition(_) => None,
            Event::Stage(stage) => Some(&stage.scope),
            Event::Diagnostic(diag) => Some(&diag.scope),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Transition(t) => &t.message,
            Event::Stage(s) => &s.message,
            Event::Diagnostic(d) => &d.message,
        }
    }

    /// Workflow the event belongs to, when it is run-scoped.
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            Event::Transition(t) => Some(&t.workflow_id),
            Event::Stage(s) => Some(&s.workflow_id),
            Event::Diagnostic(_) => None,
        }
    }

    /// Normalized JSON form for sinks that forward events over the wire.
    pub fn to_json_value(&self) -> Value {
        use serde_json::json;
        match self {
            Event::Transition(t) => json!({
                "type": "transition",
                "workflow_id": t.workflow_id,
                "state": t.state,
                "message": t.message,
                "timestamp": t.at.to_rfc3339(),
            }),
            Event::Stage(s) => json!({
                "type": "stage",
                "workflow_id": s.workflow_id,
                "stage": s.stage,
                "scope": s.scope,
                "message": s.message,
                "timestamp": s.at.to_rfc3339(),
            }),
            Event::Diagnostic(d) => json!({
                "type": "diagnostic",
                "scope": d.scope,
                "message": d.message,
            }),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Transition(t) => {
                write!(f, "[{}] {} -> {}", t.workflow_id, t.state, t.message)
            }
            Event::Stage(s) => {
                write!(f, "[{}/{}] {}: {}", s.workflow_id, s.stage, s.scope, s.message)
            }
            Event::Diagnostic(d) => write!(f, "[{}] {}", d.scope, d.message),
        }
    }
}
