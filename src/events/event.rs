use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::StateSnapshot;

/// Node identifier used for synthetic run-level events (overall start,
/// completion, failure) that no single graph node owns.
pub const SYSTEM_NODE: &str = "system";

/// Category of a progress notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Started,
    /// Intermediate diagnostic (query generated, search finished, one
    /// briefing done). Forwarding to callers is optional; the registry copy
    /// is always kept.
    Progress,
    Completed,
    Error,
    /// Incremental report text from the editor stage.
    Chunk,
}

impl ProgressKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Started => "started",
            ProgressKind::Progress => "progress",
            ProgressKind::Completed => "completed",
            ProgressKind::Error => "error",
            ProgressKind::Chunk => "chunk",
        }
    }
}

/// A single append-only progress notification from a running node.
///
/// Ordered by emission time within a node; events from different nodes in
/// the same wave may interleave arbitrarily. Delivered to every bus sink and
/// mirrored into the job's registry event queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Node that emitted the event, or [`SYSTEM_NODE`] for run-level events.
    pub node: String,
    pub kind: ProgressKind,
    /// Human-readable description, or the chunk text for [`ProgressKind::Chunk`].
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(node: impl Into<String>, kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn started(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(node, ProgressKind::Started, message)
    }

    #[must_use]
    pub fn completed(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(node, ProgressKind::Completed, message)
    }

    #[must_use]
    pub fn error(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(node, ProgressKind::Error, message)
    }

    #[must_use]
    pub fn chunk(node: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(node, ProgressKind::Chunk, text)
    }

    /// Synthetic run-level event attributed to the [`SYSTEM_NODE`].
    #[must_use]
    pub fn system(kind: ProgressKind, message: impl Into<String>) -> Self {
        Self::new(SYSTEM_NODE, kind, message)
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.node,
            self.kind.as_str(),
            self.message
        )
    }
}

/// One item of the run's output stream: a completed node and the full
/// post-merge state snapshot at that point.
///
/// The last emitted item's snapshot is the run's final result.
#[derive(Clone, Debug)]
pub struct StateEvent {
    pub node: String,
    pub snapshot: StateSnapshot,
}
