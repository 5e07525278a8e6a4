//! Engine configuration: escalation deadlines, retry bounds, persistence
//! backend selection, and event bus wiring.

use std::time::Duration as StdDuration;

use crate::escalation::EscalationTimeouts;
use crate::event_bus::{EventBus, EventSink, MemorySink, StdOutSink};
use crate::execution::DEFAULT_RETRY_LIMIT;
use crate::runtime::checkpointer::CheckpointStoreType;

/// Top-level engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub escalation: EscalationTimeouts,
    /// How often the background timer sweeps pending approvals.
    pub escalation_sweep_interval: StdDuration,
    /// Bound on attempts for transiently failing execution steps.
    pub retry_limit: u32,
    pub checkpoint_store: CheckpointStoreType,
    /// SQLite database file used when `checkpoint_store` is `Sqlite` and no
    /// `RECOFLOW_SQLITE_URL` is set.
    pub sqlite_db_name: Option<String>,
    pub event_bus: EventBusConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escalation: EscalationTimeouts::default(),
            escalation_sweep_interval: StdDuration::from_secs(30),
            retry_limit: DEFAULT_RETRY_LIMIT,
            checkpoint_store: CheckpointStoreType::InMemory,
            sqlite_db_name: Self::resolve_sqlite_db_name(None),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl EngineConfig {
    fn resolve_sqlite_db_name(provided: Option<String>) -> Option<String> {
        if let Some(name) = provided {
            return Some(name);
        }
        dotenvy::dotenv().ok();
        Some(std::env::var("SQLITE_DB_NAME").unwrap_or_else(|_| "recoflow.db".to_string()))
    }

    #[must_use]
    pub fn with_checkpoint_store(mut self, store: CheckpointStoreType) -> Self {
        self.checkpoint_store = store;
        self
    }

    #[must_use]
    pub fn with_sqlite_db_name(mut self, name: impl Into<String>) -> Self {
        self.sqlite_db_name = Self::resolve_sqlite_db_name(Some(name.into()));
        self
    }

    #[must_use]
    pub fn with_escalation(mut self, escalation: EscalationTimeouts) -> Self {
        self.escalation = escalation;
        self
    }

    #[must_use]
    pub fn with_escalation_sweep_interval(mut self, interval: StdDuration) -> Self {
        self.escalation_sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }
}

/// Declarative sink selection for the engine's event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut],
        }
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut, SinkConfig::Memory],
        }
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    pub fn build_event_bus(&self) -> EventBus {
        let sinks: Vec<Box<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::StdOut => Box::new(StdOutSink::default()) as Box<dyn EventSink>,
                SinkConfig::Memory => Box::new(MemorySink::new()) as Box<dyn EventSink>,
            })
            .collect();
        EventBus::with_sinks(sinks)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}
