//! Workflow runtime: the engine, run records, and checkpoint persistence.
//!
//! The runtime layer drives stage processors through the state machine and
//! abstracts over persistence backends:
//!
//! - **[`WorkflowEngine`]**: orchestrator for concurrent workflow runs
//! - **[`CheckpointStore`]**: trait for pluggable checkpoint persistence
//! - **[`WorkflowRun`]**: in-memory record of one run
//! - **Persistence models**: serde-friendly row shapes for durable backends
//!
//! # Persistence backends
//!
//! - **[`InMemoryCheckpointStore`]**: volatile storage for tests and development
//! - **[`SqliteCheckpointStore`](checkpointer_sqlite::SqliteCheckpointStore)**:
//!   durable SQLite persistence (feature `sqlite`)
//!
//! # Usage
//!
//! ```rust,no_run
//! use recoflow::context::SharedContext;
//! use recoflow::machine::WorkflowState;
//! use recoflow::runtime::WorkflowEngine;
//! # use std::sync::Arc;
//! # use recoflow::stage::StageProcessor;
//! # async fn example(detect: Arc<dyn StageProcessor>, assess: Arc<dyn StageProcessor>,
//! #     plan: Arc<dyn StageProcessor>, approve: Arc<dyn StageProcessor>,
//! #     execute: Arc<dyn StageProcessor>, notify: Arc<dyn StageProcessor>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = WorkflowEngine::builder()
//!     .stage(WorkflowState::Detecting, detect)
//!     .stage(WorkflowState::Analyzing, assess)
//!     .stage(WorkflowState::Planning, plan)
//!     .stage(WorkflowState::Approving, approve)
//!     .stage(WorkflowState::Executing, execute)
//!     .stage(WorkflowState::Notifying, notify)
//!     .build()
//!     .await?;
//!
//! let report = engine
//!     .start_and_run(
//!         SharedContext::builder()
//!             .with_value("disruption_event", serde_json::json!({"event_type": "weather"}))
//!             .build(),
//!     )
//!     .await?;
//! println!("run ended in {}", report.state);
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod config;
pub mod engine;
pub mod persistence;
pub mod run;

pub use checkpointer::{
    Checkpoint, CheckpointError, CheckpointStore, CheckpointStoreType, InMemoryCheckpointStore,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SqliteCheckpointStore;
pub use config::{EngineConfig, EventBusConfig, SinkConfig};
pub use engine::{
    ApprovalDecision, EngineError, EscalationSweep, WorkflowEngine, WorkflowEngineBuilder,
};
pub use persistence::{PersistedCheckpoint, PersistenceError};
pub use run::{AuditEntry, RunReport, WorkflowRun};
