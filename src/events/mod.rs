//! Progress events and their fan-out plumbing.
//!
//! Two event surfaces exist side by side:
//!
//! - [`ProgressEvent`]: fine-grained, append-only notifications emitted by
//!   node bodies while they run (started/completed/error/chunk). These flow
//!   through the [`EventBus`] to pluggable [`EventSink`]s and are mirrored
//!   into the job's registry record.
//! - [`StateEvent`]: the run's output stream — one `(node, post-merge
//!   snapshot)` pair per completed node, consumed lazily by the caller.

mod bus;
mod event;
mod sink;

pub use bus::EventBus;
pub use event::{ProgressEvent, ProgressKind, StateEvent, SYSTEM_NODE};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
