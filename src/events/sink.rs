use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::ProgressEvent;

/// Abstraction over an output target that consumes progress events.
pub trait EventSink: Send + Sync {
    /// Handle a structured event. The sink decides how to format it.
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()>;
}

/// Stdout sink, one formatted line per event.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers (e.g., SSE hosts).
///
/// Events are forwarded to a tokio mpsc channel without blocking.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// MemorySink captures events in emission order.
    fn memory_sink_captures() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer
            .handle(&ProgressEvent::started("a", "first"))
            .unwrap();
        writer
            .handle(&ProgressEvent::completed("a", "second"))
            .unwrap();

        let captured = sink.snapshot();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].message, "first");

        sink.clear();
        assert!(sink.snapshot().is_empty());
    }

    #[tokio::test]
    /// ChannelSink forwards to the receiver and errors once it is dropped.
    async fn channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        sink.handle(&ProgressEvent::started("b", "go")).unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.node, "b");

        drop(rx);
        assert!(sink.handle(&ProgressEvent::completed("b", "done")).is_err());
    }
}
