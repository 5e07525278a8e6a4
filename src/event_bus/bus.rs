use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::event::Event;
use super::sink::{EventSink, StdOutSink};

struct Listener {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Receives events from the engine and stage processors and broadcasts them
/// to every attached sink.
///
/// Delivery is best-effort: a sink error is logged and never propagates back
/// into the workflow.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    tx: flume::Sender<Event>,
    rx: flume::Receiver<Event>,
    listener: Mutex<Option<Listener>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    pub fn with_sink<S: EventSink + 'static>(sink: S) -> Self {
        Self::with_sinks(vec![Box::new(sink)])
    }

    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            tx,
            rx,
            listener: Mutex::new(None),
        }
    }

    /// Attach another sink; it receives events from this point on.
    pub fn add_sink<S: EventSink + 'static>(&self, sink: S) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Sender handle for producers (the engine clones this into every
    /// [`StageContext`](crate::stage::StageContext)).
    pub fn get_sender(&self) -> flume::Sender<Event> {
        self.tx.clone()
    }

    /// Spawn the background task that drains the channel into the sinks.
    /// Idempotent: a second call is a no-op.
    pub fn listen_for_events(&self) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return;
        }

        let rx = self.rx.clone();
        let sinks = Arc::clone(&self.sinks);
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = rx.recv_async() => {
                        let Ok(event) = received else { break };
                        for sink in sinks.lock().iter_mut() {
                            if let Err(e) = sink.handle(&event) {
                                tracing::warn!(error = %e, "event sink error");
                            }
                        }
                    }
                }
            }
        });

        *listener = Some(Listener { shutdown, task });
    }

    /// Stop the background listener; buffered events are dropped.
    pub async fn stop_listener(&self) {
        let taken = self.listener.lock().take();
        if let Some(listener) = taken {
            let _ = listener.shutdown.send(());
            let _ = listener.task.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            let _ = listener.shutdown.send(());
            listener.task.abort();
        }
    }
}
