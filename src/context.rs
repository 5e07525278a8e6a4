//! Shared workflow context: the single mutable document a run accumulates.
//!
//! Each workflow run owns exactly one [`SharedContext`]. Stage processors
//! receive it by mutable reference, read what earlier stages produced, and
//! write their own results under the documented keys in [`keys`]. The context
//! also carries an append-only history of notable actions for the audit
//! trail; history entries are never removed or rewritten.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known context keys the engine's transition rule reads.
///
/// Stage processors are free to store anything else under their own keys;
/// only these influence control flow.
pub mod keys {
    /// `bool`. Detect stage: whether a significant disruption exists.
    pub const DISRUPTION_DETECTED: &str = "disruption_detected";
    /// `bool`. AssessImpact stage: whether recovery is required (absent
    /// defaults to `true`).
    pub const NEEDS_RECOVERY: &str = "needs_recovery";
    /// Array of scenario objects produced by the Plan stage.
    pub const RECOVERY_SCENARIOS: &str = "recovery_scenarios";
    /// The scenario object selected for execution.
    pub const RECOMMENDED_SCENARIO: &str = "recommended_scenario";
    /// String: `PENDING`, `APPROVED`, `AUTO_APPROVED`, or `REJECTED`.
    pub const APPROVAL_STATUS: &str = "approval_status";
    /// String: approval level required for the recommended scenario
    /// (`SUPERVISOR`, `MANAGER`, `EXECUTIVE`); absent means `SUPERVISOR`.
    pub const REQUIRED_APPROVAL_LEVEL: &str = "required_approval_level";
    /// String: `COMPLETED`, `PARTIAL`, or `FAILED`.
    pub const EXECUTION_STATUS: &str = "execution_status";
    /// `bool`. Any stage: business rejection, run completes as `REJECTED`.
    pub const REJECTED: &str = "rejected";
    /// `bool`. Any stage: unrecoverable condition, run fails.
    pub const FAILED: &str = "failed";
}

/// One audit-trail entry: who did what, when, with what payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub payload: Value,
}

/// The run-scoped key/value document plus its append-only history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    data: FxHashMap<String, Value>,
    history: Vec<HistoryEntry>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SharedContextBuilder {
        SharedContextBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Boolean read with an absent-or-non-bool default of `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.data.get(key).and_then(Value::as_array)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Append an audit-trail entry.
    pub fn record(&mut self, actor: impl Into<String>, action: impl Into<String>, payload: Value) {
        self.history.push(HistoryEntry {
            at: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            payload,
        });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn data(&self) -> &FxHashMap<String, Value> {
        &self.data
    }

    /// Deep copy for checkpointing.
    pub fn snapshot(&self) -> SharedContext {
        self.clone()
    }
}

/// Builder for seeding a context before the run starts.
#[derive(Debug, Default)]
pub struct SharedContextBuilder {
    context: SharedContext,
}

impl SharedContextBuilder {
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.set(key, value);
        self
    }

    pub fn build(self) -> SharedContext {
        self.context
    }
}
