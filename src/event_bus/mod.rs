//! Best-effort event fan-out for workflow transitions and stage diagnostics.
//!
//! The engine publishes one [`Event::Transition`] per state change; stage
//! processors may publish [`Event::Stage`] breadcrumbs through their context.
//! Sinks consume events on a background task; a slow or failing sink never
//! blocks or fails a workflow.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, StageEvent, TransitionEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
