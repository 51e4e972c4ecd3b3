//! The node execution contract: trait, context, and error taxonomy.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::events::{ProgressEvent, ProgressKind};
use crate::providers::ProviderError;
use crate::registry::JobStatusRegistry;
use crate::state::{StateSnapshot, StateUpdate};

/// A unit of work in the analysis graph.
///
/// Nodes receive the current state snapshot and execution context, perform
/// their work, and return one partial state update. Progress events go out
/// through the context while the node runs; the returned [`StateUpdate`] is
/// the single, explicit terminal result.
///
/// # Contract
///
/// - **Read-only input**: a node must not assume it can mutate the snapshot
///   it was given; re-invocation on the same snapshot must be idempotent.
/// - **Disjoint writes**: a node writes only the state fields it
///   contractually owns and knows sibling nodes only by the keys they write.
/// - **Fatal by default**: a node that cannot produce its contracted output
///   returns `Err`, which aborts the run after the current wave drains.
///   Partial sub-failures (one of several search queries failing) may be
///   downgraded locally and absorbed into a smaller result.
///
/// # Examples
///
/// ```
/// use prospector::node::{Node, NodeContext, NodeError};
/// use prospector::state::{StateSnapshot, StateUpdate};
/// use prospector::message::Message;
/// use async_trait::async_trait;
///
/// struct Announce;
///
/// #[async_trait]
/// impl Node for Announce {
///     async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<StateUpdate, NodeError> {
///         ctx.emit_started("announcing");
///         let update = StateUpdate::new()
///             .with_message(Message::system(&format!("topic: {}", snapshot.topic)));
///         ctx.emit_completed("announced");
///         Ok(update)
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node against the given snapshot.
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError>;
}

/// Execution context passed to each node invocation.
///
/// Carries the node's identity, the wave it runs in, and the two event
/// sinks a node reports to: the run's event bus and the injected
/// [`JobStatusRegistry`].
#[derive(Clone)]
pub struct NodeContext {
    /// Name of the node being executed.
    pub node: String,
    /// Zero-based wave number this node was scheduled in.
    pub wave: usize,
    /// Job id of the current run.
    pub job_id: String,
    event_sender: flume::Sender<ProgressEvent>,
    registry: JobStatusRegistry,
}

impl NodeContext {
    #[must_use]
    pub fn new(
        node: impl Into<String>,
        wave: usize,
        job_id: impl Into<String>,
        event_sender: flume::Sender<ProgressEvent>,
        registry: JobStatusRegistry,
    ) -> Self {
        Self {
            node: node.into(),
            wave,
            job_id: job_id.into(),
            event_sender,
            registry,
        }
    }

    /// Emit a progress event attributed to this node.
    ///
    /// Every event is delivered to both sinks: the bus (for live observers)
    /// and the job's registry queue (for pollers). A disconnected bus is
    /// tolerated; the registry copy is what must never be lost.
    pub fn emit(&self, kind: ProgressKind, message: impl Into<String>) {
        let event = ProgressEvent::new(&self.node, kind, message);
        self.registry.append_event(&self.job_id, event.clone());
        let _ = self.event_sender.send(event);
    }

    pub fn emit_started(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Started, message);
    }

    pub fn emit_progress(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Progress, message);
    }

    pub fn emit_completed(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Completed, message);
    }

    pub fn emit_error(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Error, message);
    }

    pub fn emit_chunk(&self, text: impl Into<String>) {
        self.emit(ProgressKind::Chunk, text);
    }

    /// Append a debug note to the job's registry record.
    pub fn push_debug(&self, note: impl Into<String>) {
        self.registry.push_debug(&self.job_id, note);
    }

    /// The injected registry handle, for nodes that need richer status
    /// updates than event appends.
    #[must_use]
    pub fn registry(&self) -> &JobStatusRegistry {
        &self.registry
    }
}

/// Fatal errors raised by node execution.
///
/// Any of these aborts the run once the current wave has drained; there is
/// no automatic retry.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(prospector::node::missing_input),
        help("Check that the upstream node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// An external provider call failed and no usable fallback existed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),

    /// A provider answered, but with content the node cannot use.
    #[error("unusable provider response in {stage}: {reason}")]
    #[diagnostic(code(prospector::node::unusable_response))]
    UnusableResponse {
        stage: &'static str,
        reason: String,
    },
}
