//! # Recoflow: Checkpointed Shipment-Recovery Orchestration
//!
//! Recoflow is an engine for multi-stage shipment-disruption recovery
//! workflows: resumable stage execution with per-stage checkpoints,
//! reverse-order rollback of committed side effects, and timeout-driven
//! approval escalation.
//!
//! ## Core Concepts
//!
//! - **Stages**: Six opaque async processors (Detect, AssessImpact, Plan,
//!   Approve, Execute, Notify) driven strictly in sequence
//! - **Shared context**: The single mutable document a run accumulates;
//!   stages communicate outcomes through documented keys
//! - **Transition rule**: A pure function of `(completed stage, context)`;
//!   stage processors may be non-deterministic, transitions never are
//! - **Checkpoints**: One restore point after every stage, carrying the
//!   context and every committed side effect
//! - **Rollback**: Compensation of committed actions in exact reverse order
//! - **Escalation**: Pending approvals advance one authority level per
//!   deadline lapse: `SUPERVISOR → MANAGER → EXECUTIVE`
//!
//! ## Quick Start
//!
//! Implement [`stage::StageProcessor`] for each stage, then assemble an
//! engine:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use recoflow::context::{SharedContext, keys};
//! use recoflow::machine::WorkflowState;
//! use recoflow::runtime::WorkflowEngine;
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
//!         context.set(keys::DISRUPTION_DETECTED, json!(true));
//!         Ok(())
//!     }
//! }
//! # async fn example(
//! #     assess: Arc<dyn StageProcessor>, plan: Arc<dyn StageProcessor>,
//! #     approve: Arc<dyn StageProcessor>, execute: Arc<dyn StageProcessor>,
//! #     notify: Arc<dyn StageProcessor>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let engine = WorkflowEngine::builder()
//!     .stage(WorkflowState::Detecting, Arc::new(DetectStage))
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
//!             .with_value("disruption_event", json!({"event_type": "weather"}))
//!             .build(),
//!     )
//!     .await?;
//! println!("{} ended in {}", report.workflow_id, report.state);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`context`] - Shared run context and documented keys
//! - [`machine`] - Workflow states and the pure transition rule
//! - [`stage`] - The stage processor contract
//! - [`execution`] - Priority-ordered plan building and step execution
//! - [`rollback`] - Reverse-order compensation of committed side effects
//! - [`escalation`] - Approval levels, tickets, and timeout escalation
//! - [`event_bus`] - Best-effort event fan-out with pluggable sinks
//! - [`runtime`] - The engine, run records, and checkpoint persistence

pub mod context;
pub mod escalation;
pub mod event_bus;
pub mod execution;
pub mod machine;
pub mod rollback;
pub mod runtime;
pub mod stage;
pub mod telemetry;
