use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::Event;

/// Abstraction over an output target that consumes full [`Event`] objects.
pub trait EventSink: Sync + Send {
    /// Handle a structured event. The sink decides how to serialize it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Stdout sink: one line per event using the event's `Display` form.
pub struct StdOutSink {
    out: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self { out: io::stdout() }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        writeln!(self.out, "{event}")?;
        self.out.flush()
    }
}

/// In-memory sink for tests and snapshots. Cloning shares the underlying
/// buffer, so a clone handed to the bus stays readable from the test.
#[derive(Clone, Default)]
pub struct MemorySink {
    captured: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Event> {
        self.captured.lock().clone()
    }

    pub fn clear(&self) {
        self.captured.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.captured.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards events into a tokio mpsc channel for async consumers
/// (dashboards, SSE endpoints, websocket fan-out).
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::WorkflowState;

    #[test]
    fn memory_sink_clones_share_the_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer
            .handle(&Event::transition("wf", WorkflowState::Detecting, "started"))
            .unwrap();
        assert_eq!(sink.snapshot().len(), 1);
        sink.clear();
        assert!(sink.snapshot().is_empty());
    }

    #[tokio::test]
    async fn channel_sink_reports_a_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        drop(rx);
        let err = sink
            .handle(&Event::transition("wf", WorkflowState::Completed, "done"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
