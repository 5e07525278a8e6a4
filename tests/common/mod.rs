//! Shared fixtures: scripted stage processors, stubbed recovery actions, and
//! an engine harness wired to an in-memory store and a memory event sink.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use recoflow::context::SharedContext;
use recoflow::event_bus::{EventBus, MemorySink};
use recoflow::execution::{ActionError, RecoveryActions};
use recoflow::machine::WorkflowState;
use recoflow::rollback::CommittedAction;
use recoflow::runtime::{InMemoryCheckpointStore, WorkflowEngine, WorkflowEngineBuilder};
use recoflow::stage::{StageContext, StageError, StageProcessor};

/// Stage processor that writes a fixed set of context values, optionally
/// records commits, and optionally fails.
#[derive(Default)]
pub struct ScriptedStage {
    sets: Vec<(String, Value)>,
    commits: Vec<(String, String)>,
    fail: Option<String>,
}

impl ScriptedStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.sets.push((key.into(), value));
        self
    }

    pub fn commit(mut self, action_type: impl Into<String>, target: impl Into<String>) -> Self {
        self.commits.push((action_type.into(), target.into()));
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail = Some(message.into());
        self
    }
}

#[async_trait]
impl StageProcessor for ScriptedStage {
    async fn process(
        &self,
        context: &mut SharedContext,
        ctx: StageContext,
    ) -> Result<(), StageError> {
        for (key, value) in &self.sets {
            context.set(key.clone(), value.clone());
        }
        for (action_type, target) in &self.commits {
            ctx.record_commit(CommittedAction::new(
                action_type.clone(),
                target.clone(),
                json!({"original": format!("orig-{target}")}),
            ));
        }
        match &self.fail {
            Some(message) => Err(StageError::Other(message.clone())),
            None => Ok(()),
        }
    }
}

/// Recovery actions with scriptable failures.
#[derive(Default)]
pub struct StubActions {
    pub fail_validate: bool,
    /// Item ids whose rebooking fails permanently.
    pub fail_rebook: Vec<String>,
}

#[async_trait]
impl RecoveryActions for StubActions {
    async fn validate_capacity(
        &self,
        target_id: &str,
        _required_weight_kg: f64,
    ) -> Result<(), ActionError> {
        if self.fail_validate {
            Err(ActionError::permanent(format!("no capacity on {target_id}")))
        } else {
            Ok(())
        }
    }

    async fn rebook(&self, item_id: &str, _target_id: &str) -> Result<Value, ActionError> {
        if self.fail_rebook.iter().any(|id| id == item_id) {
            Err(ActionError::permanent(format!("rebooking refused for {item_id}")))
        } else {
            Ok(json!({"original_assignment": format!("orig-{item_id}")}))
        }
    }

    async fn verify_completion(
        &self,
        _target_id: &str,
        rebooked: usize,
        expected: usize,
    ) -> Result<(), ActionError> {
        if rebooked == expected {
            Ok(())
        } else {
            Err(ActionError::permanent(format!(
                "only {rebooked} of {expected} items recovered"
            )))
        }
    }
}

/// Engine plus handles to its store and captured events.
pub struct EngineSetup {
    pub engine: WorkflowEngine,
    pub store: Arc<InMemoryCheckpointStore>,
    pub events: MemorySink,
}

/// Build an engine on an in-memory store with a memory event sink; the
/// closure registers stages and tweaks config.
pub async fn build_engine<F>(configure: F) -> EngineSetup
where
    F: FnOnce(WorkflowEngineBuilder) -> WorkflowEngineBuilder,
{
    recoflow::telemetry::init();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let events = MemorySink::new();
    let bus = EventBus::with_sinks(vec![Box::new(events.clone())]);
    let builder = WorkflowEngine::builder()
        .checkpoint_store(store.clone())
        .event_bus(bus);
    let engine = configure(builder).build().await.expect("engine builds");
    EngineSetup {
        engine,
        store,
        events,
    }
}

/// Two affected items, one standard and one critical.
pub fn default_items() -> Value {
    json!([
        {"id": "SHIP-001", "priority": "STANDARD", "weight_kg": 120.0},
        {"id": "SHIP-002", "priority": "CRITICAL", "weight_kg": 80.0},
    ])
}

/// One viable scenario already flagged as recommended.
pub fn recommended_scenario() -> Value {
    json!({
        "id": "scenario-1",
        "target_id": "FL-900",
        "risk_score": 0.2,
        "is_recommended": true,
    })
}

/// Register happy-path stages: disruption detected, recovery needed, one
/// scenario, auto-approved, real Execute stage over [`StubActions`], notify.
pub fn happy_path_stages(builder: WorkflowEngineBuilder) -> WorkflowEngineBuilder {
    happy_path_with_actions(builder, StubActions::default())
}

pub fn happy_path_with_actions(
    builder: WorkflowEngineBuilder,
    actions: StubActions,
) -> WorkflowEngineBuilder {
    builder
        .stage(
            WorkflowState::Detecting,
            Arc::new(ScriptedStage::new().set("disruption_detected", json!(true))),
        )
        .stage(
            WorkflowState::Analyzing,
            Arc::new(
                ScriptedStage::new()
                    .set("needs_recovery", json!(true))
                    .set("affected_items", default_items()),
            ),
        )
        .stage(
            WorkflowState::Planning,
            Arc::new(
                ScriptedStage::new()
                    .set("recovery_scenarios", json!([recommended_scenario()]))
                    .set("recommended_scenario", recommended_scenario()),
            ),
        )
        .stage(
            WorkflowState::Approving,
            Arc::new(ScriptedStage::new().set("approval_status", json!("AUTO_APPROVED"))),
        )
        .stage(
            WorkflowState::Executing,
            Arc::new(recoflow::execution::ExecuteStage::new(Arc::new(actions))),
        )
        .stage(
            WorkflowState::Notifying,
            Arc::new(ScriptedStage::new().set("notifications_sent", json!(true))),
        )
}
