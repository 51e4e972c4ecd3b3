use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{sync::oneshot, task};
use tracing::warn;

use super::event::ProgressEvent;
use super::sink::{EventSink, StdOutSink};

/// Receives progress events from node bodies and broadcasts them to sinks.
///
/// Producers hold a cloned [`flume::Sender`] (see [`get_sender`](Self::get_sender));
/// a background listener task drains the channel and fans each event out to
/// every registered sink. The listener is started explicitly and stopped
/// either via [`stop_listener`](Self::stop_listener) (graceful, drains the
/// channel) or on drop (aborted).
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<ProgressEvent>, flume::Receiver<ProgressEvent>),
    listener: Mutex<Option<ListenerState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create an EventBus with multiple sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Mutex::new(None),
        }
    }

    /// Dynamically add a sink (useful for per-request streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Clone of the sender side so producers can emit events.
    #[must_use]
    pub fn get_sender(&self) -> flume::Sender<ProgressEvent> {
        self.event_channel.0.clone()
    }

    /// Spawn the background task that broadcasts events to all sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock();
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Drain whatever is already queued before exiting.
                        while let Ok(event) = receiver.try_recv() {
                            dispatch(&sinks, &event);
                        }
                        break;
                    }
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => dispatch(&sinks, &event),
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, draining queued events first.
    pub async fn stop_listener(&self) {
        let state = self.listener.lock().take();
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

fn dispatch(sinks: &Arc<Mutex<Vec<Box<dyn EventSink>>>>, event: &ProgressEvent) {
    let mut guard = sinks.lock();
    for sink in guard.iter_mut() {
        if let Err(e) = sink.handle(event) {
            warn!(error = %e, "event sink failed");
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(state) = self.listener.lock().take() {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;

    #[tokio::test]
    /// Events sent before shutdown all reach every sink.
    async fn broadcasts_to_sinks() {
        let memory = MemorySink::new();
        let bus = EventBus::with_sink(memory.clone());
        bus.listen_for_events();

        let sender = bus.get_sender();
        for i in 0..5 {
            sender
                .send(ProgressEvent::started("n", format!("event {i}")))
                .unwrap();
        }
        bus.stop_listener().await;

        assert_eq!(memory.snapshot().len(), 5);
    }

    #[tokio::test]
    /// Sinks added after startup receive subsequent events.
    async fn add_sink_after_start() {
        let bus = EventBus::with_sinks(vec![]);
        bus.listen_for_events();

        let late = MemorySink::new();
        bus.add_sink(late.clone());
        bus.get_sender()
            .send(ProgressEvent::completed("n", "late delivery"))
            .unwrap();
        bus.stop_listener().await;

        assert_eq!(late.snapshot().len(), 1);
    }

    #[tokio::test]
    /// Starting the listener twice does not duplicate delivery.
    async fn listen_is_idempotent() {
        let memory = MemorySink::new();
        let bus = EventBus::with_sink(memory.clone());
        bus.listen_for_events();
        bus.listen_for_events();

        bus.get_sender()
            .send(ProgressEvent::started("n", "once"))
            .unwrap();
        bus.stop_listener().await;

        assert_eq!(memory.snapshot().len(), 1);
    }
}
