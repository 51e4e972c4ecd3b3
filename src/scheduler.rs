//! Wave-by-wave execution of a compiled graph.
//!
//! The scheduler walks the precomputed wave schedule of a
//! [`GraphDefinition`]: per wave it takes one immutable snapshot, launches
//! every node of the wave concurrently, waits for all of them (a failing
//! node never cuts its siblings short), then merges the terminal updates
//! into the authoritative state in node-name order. One [`StateEvent`] is
//! emitted per completed node carrying the full post-merge snapshot; the
//! last emitted item is the run's final result.
//!
//! Failure semantics: after a failed wave has fully drained and its
//! successful siblings' contributions are merged, the run aborts — no later
//! wave is scheduled and the error surfaces through the [`RunHandle`].

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::events::{ProgressEvent, StateEvent};
use crate::graph::GraphDefinition;
use crate::node::{NodeContext, NodeError};
use crate::registry::JobStatusRegistry;
use crate::state::AnalysisState;

/// Errors surfaced by a run.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// A node body returned a fatal error.
    #[error("node {node} failed in wave {wave}: {source}")]
    #[diagnostic(code(prospector::scheduler::node_run))]
    NodeRun {
        node: String,
        wave: usize,
        #[source]
        source: NodeError,
    },

    /// A node task panicked or was cancelled before producing a result.
    #[error("node {node} did not complete in wave {wave}")]
    #[diagnostic(code(prospector::scheduler::join))]
    Join { node: String, wave: usize },

    /// The scheduler task itself was lost before reporting a result.
    #[error("scheduler task ended without a result")]
    #[diagnostic(code(prospector::scheduler::task_lost))]
    TaskLost,
}

impl SchedulerError {
    /// Name of the node the error is attributed to.
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            SchedulerError::NodeRun { node, .. } | SchedulerError::Join { node, .. } => node,
            SchedulerError::TaskLost => "scheduler",
        }
    }
}

/// Handle on a spawned run; resolves to the final merged state.
pub struct RunHandle {
    handle: tokio::task::JoinHandle<Result<AnalysisState, SchedulerError>>,
}

impl RunHandle {
    /// Wait for the run to finish and return its final state.
    pub async fn join(self) -> Result<AnalysisState, SchedulerError> {
        match self.handle.await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::TaskLost),
        }
    }

    /// Abandon the run. Nodes already dispatched keep running detached.
    pub fn abort(self) {
        self.handle.abort();
    }
}

/// Executes a compiled graph wave by wave.
pub struct WaveScheduler {
    graph: Arc<GraphDefinition>,
}

impl WaveScheduler {
    #[must_use]
    pub fn new(graph: GraphDefinition) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    #[must_use]
    pub fn graph(&self) -> &GraphDefinition {
        &self.graph
    }

    /// Launch a run in the background.
    ///
    /// Returns the run handle plus the lazy, single-consumer output stream.
    /// Dropping the stream receiver does not stop the run; the final state
    /// is still available through the handle.
    #[must_use]
    pub fn spawn(
        &self,
        initial: AnalysisState,
        registry: JobStatusRegistry,
        event_sender: flume::Sender<ProgressEvent>,
    ) -> (RunHandle, flume::Receiver<StateEvent>) {
        let (stream_tx, stream_rx) = flume::unbounded();
        let graph = self.graph.clone();
        let handle = tokio::spawn(async move {
            run_to_completion(graph, initial, registry, event_sender, stream_tx).await
        });
        (RunHandle { handle }, stream_rx)
    }
}

#[instrument(skip_all, fields(job_id = %state.job_id, waves = graph.waves().len()))]
async fn run_to_completion(
    graph: Arc<GraphDefinition>,
    mut state: AnalysisState,
    registry: JobStatusRegistry,
    event_sender: flume::Sender<ProgressEvent>,
    stream_tx: flume::Sender<StateEvent>,
) -> Result<AnalysisState, SchedulerError> {
    for (wave_index, wave) in graph.waves().iter().enumerate() {
        info!(wave = wave_index, nodes = ?wave, "dispatching wave");
        let snapshot = state.snapshot();

        // Launch every node of the wave against the same snapshot.
        let mut running = Vec::with_capacity(wave.len());
        for name in wave {
            let body = graph
                .body(name)
                .unwrap_or_else(|| unreachable!("compiled wave references unknown node"));
            let ctx = NodeContext::new(
                name.clone(),
                wave_index,
                state.job_id.clone(),
                event_sender.clone(),
                registry.clone(),
            );
            let snap = snapshot.clone();
            let task = tokio::spawn(async move { body.run(snap, ctx).await });
            running.push((name.clone(), task));
        }

        // Drain the whole wave before acting on any failure, so successful
        // siblings never lose their contributions.
        let mut outcomes = Vec::with_capacity(running.len());
        for (name, task) in running {
            let outcome = match task.await {
                Ok(result) => result.map_err(|source| SchedulerError::NodeRun {
                    node: name.clone(),
                    wave: wave_index,
                    source,
                }),
                Err(join_err) => {
                    error!(node = %name, wave = wave_index, error = %join_err, "node task lost");
                    Err(SchedulerError::Join {
                        node: name.clone(),
                        wave: wave_index,
                    })
                }
            };
            outcomes.push((name, outcome));
        }

        // Merge in node-name order (the wave is lexicographically sorted),
        // so the final state is independent of completion order.
        let mut first_failure: Option<SchedulerError> = None;
        for (name, outcome) in outcomes {
            match outcome {
                Ok(update) => {
                    debug!(node = %name, wave = wave_index, empty = update.is_empty(), "merging update");
                    state.apply(&update);
                    if stream_tx
                        .send(StateEvent {
                            node: name.clone(),
                            snapshot: state.snapshot(),
                        })
                        .is_err()
                    {
                        debug!(node = %name, "stream receiver dropped");
                    }
                }
                Err(err) => {
                    let event = ProgressEvent::error(err.node(), err.to_string());
                    registry.append_event(&state.job_id, event.clone());
                    let _ = event_sender.send(event);
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_failure {
            warn!(wave = wave_index, error = %err, "aborting run after failed wave");
            return Err(err);
        }
    }

    info!(terminal = graph.terminal(), "run complete");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::message::Message;
    use crate::node::Node;
    use crate::state::{StateSnapshot, StateUpdate};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Announce(&'static str);

    #[async_trait]
    impl Node for Announce {
        async fn run(
            &self,
            _: StateSnapshot,
            ctx: NodeContext,
        ) -> Result<StateUpdate, NodeError> {
            ctx.emit_started("working");
            Ok(StateUpdate::new().with_message(Message::system(self.0)))
        }
    }

    struct Fails;

    #[async_trait]
    impl Node for Fails {
        async fn run(
            &self,
            _: StateSnapshot,
            _: NodeContext,
        ) -> Result<StateUpdate, NodeError> {
            Err(NodeError::MissingInput { what: "nothing" })
        }
    }

    struct Slow(&'static str);

    #[async_trait]
    impl Node for Slow {
        async fn run(
            &self,
            _: StateSnapshot,
            _: NodeContext,
        ) -> Result<StateUpdate, NodeError> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(StateUpdate::new().with_message(Message::system(self.0)))
        }
    }

    fn spawn_graph(
        graph: GraphDefinition,
    ) -> (RunHandle, flume::Receiver<StateEvent>, JobStatusRegistry) {
        let registry = JobStatusRegistry::new();
        registry.get_or_create("job-t");
        let (tx, _rx) = flume::unbounded();
        let scheduler = WaveScheduler::new(graph);
        let (handle, stream) =
            scheduler.spawn(AnalysisState::new("topic", "job-t"), registry.clone(), tx);
        (handle, stream, registry)
    }

    #[tokio::test]
    /// One stream item per node, in wave order, ending with the terminal.
    async fn emits_one_item_per_node() {
        let graph = GraphBuilder::new()
            .add_node("entry", [] as [&str; 0], Announce("entry ran"))
            .add_node("a", ["entry"], Announce("a ran"))
            .add_node("b", ["entry"], Announce("b ran"))
            .add_node("join", ["a", "b"], Announce("join ran"))
            .compile()
            .unwrap();
        let (handle, stream, _) = spawn_graph(graph);

        let final_state = handle.join().await.unwrap();
        let items: Vec<StateEvent> = stream.drain().collect();
        let order: Vec<&str> = items.iter().map(|e| e.node.as_str()).collect();
        assert_eq!(order, vec!["entry", "a", "b", "join"]);
        assert_eq!(final_state.messages.len(), 4);

        // The last item's snapshot is the final result.
        let last = items.last().unwrap();
        assert_eq!(last.snapshot.messages.len(), 4);
    }

    #[tokio::test]
    /// A failing node aborts the run after its wave drains; the sibling's
    /// contribution is preserved in the stream snapshots.
    async fn failure_aborts_after_wave() {
        let graph = GraphBuilder::new()
            .add_node("entry", [] as [&str; 0], Announce("entry ran"))
            .add_node("bad", ["entry"], Fails)
            .add_node("ok", ["entry"], Slow("ok ran"))
            .add_node("join", ["bad", "ok"], Announce("join ran"))
            .compile()
            .unwrap();
        let (handle, stream, registry) = spawn_graph(graph);

        let err = handle.join().await.unwrap_err();
        assert_eq!(err.node(), "bad");

        let items: Vec<StateEvent> = stream.drain().collect();
        let order: Vec<&str> = items.iter().map(|e| e.node.as_str()).collect();
        // "join" never ran; "ok" finished and was merged.
        assert_eq!(order, vec!["entry", "ok"]);
        assert!(
            items
                .last()
                .unwrap()
                .snapshot
                .messages
                .iter()
                .any(|m| m.content == "ok ran")
        );

        // The failure was recorded in the registry's event queue.
        let status = registry.snapshot("job-t").unwrap();
        assert!(
            status
                .events
                .iter()
                .any(|e| e.node == "bad" && e.kind == crate::events::ProgressKind::Error)
        );
    }

    #[tokio::test]
    /// Dropping the stream receiver does not fail the run.
    async fn stream_drop_tolerated() {
        let graph = GraphBuilder::new()
            .add_node("entry", [] as [&str; 0], Announce("entry ran"))
            .add_node("end", ["entry"], Announce("end ran"))
            .compile()
            .unwrap();
        let (handle, stream, _) = spawn_graph(graph);
        drop(stream);
        let final_state = handle.join().await.unwrap();
        assert_eq!(final_state.messages.len(), 2);
    }
}
