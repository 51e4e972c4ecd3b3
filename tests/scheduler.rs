//! Integration tests for wave execution, determinism, and event fan-out.

use std::time::Duration;

use async_trait::async_trait;
use prospector::document::Document;
use prospector::events::{EventBus, MemorySink, ProgressKind, StateEvent};
use prospector::graph::GraphBuilder;
use prospector::message::Message;
use prospector::node::{Node, NodeContext, NodeError};
use prospector::registry::JobStatusRegistry;
use prospector::scheduler::WaveScheduler;
use prospector::state::{AnalysisState, StateSnapshot, StateUpdate};
use prospector::types::Dimension;

/// Writes one document into its own dimension after a configurable delay,
/// so completion order can be forced independent of merge order.
struct DimWriter {
    dim: Dimension,
    delay_ms: u64,
}

#[async_trait]
impl Node for DimWriter {
    async fn run(&self, _: StateSnapshot, ctx: NodeContext) -> Result<StateUpdate, NodeError> {
        ctx.emit_started(format!("{} writer", self.dim));
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        ctx.emit_completed(format!("{} written", self.dim));
        Ok(StateUpdate::new()
            .with_research(
                self.dim,
                vec![
                    Document::new(format!("https://{}", self.dim), "t", "c").with_score(0.5),
                ]
                .into(),
            )
            .with_message(Message::system(&format!("{} done", self.dim))))
    }
}

struct Entry;

#[async_trait]
impl Node for Entry {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<StateUpdate, NodeError> {
        Ok(StateUpdate::new())
    }
}

struct Join;

#[async_trait]
impl Node for Join {
    async fn run(&self, snapshot: StateSnapshot, _: NodeContext) -> Result<StateUpdate, NodeError> {
        let total: usize = Dimension::ALL
            .iter()
            .map(|d| snapshot.research_for(*d).len())
            .sum();
        Ok(StateUpdate::new().with_message(Message::system(&format!("joined {total}"))))
    }
}

fn fan_out_graph(delays: [u64; 4]) -> WaveScheduler {
    let mut builder = GraphBuilder::new().add_node("a_entry", [] as [&str; 0], Entry);
    let mut names = Vec::new();
    for (dim, delay_ms) in Dimension::ALL.into_iter().zip(delays) {
        let name = format!("w_{dim}");
        builder = builder.add_node(name.clone(), ["a_entry"], DimWriter { dim, delay_ms });
        names.push(name);
    }
    WaveScheduler::new(builder.add_node("z_join", names, Join).compile().unwrap())
}

async fn run_fan_out(delays: [u64; 4]) -> (AnalysisState, Vec<StateEvent>) {
    let scheduler = fan_out_graph(delays);
    let registry = JobStatusRegistry::new();
    registry.get_or_create("job-s");
    let (tx, _rx) = flume::unbounded();
    let (handle, stream) =
        scheduler.spawn(AnalysisState::new("topic", "job-s"), registry, tx);
    let state = handle.join().await.unwrap();
    (state, stream.drain().collect())
}

#[tokio::test]
/// The final state is identical whether the wave's nodes finish in merge
/// order or in reverse, given disjoint write-keys.
async fn completion_order_does_not_matter() {
    let (forward, _) = run_fan_out([10, 20, 30, 40]).await;
    let (reverse, _) = run_fan_out([40, 30, 20, 10]).await;

    for dim in Dimension::ALL {
        assert_eq!(
            forward.research_for(dim).urls(),
            reverse.research_for(dim).urls()
        );
    }
    let contents = |state: &AnalysisState| -> Vec<String> {
        state.messages.iter().map(|m| m.content.clone()).collect()
    };
    assert_eq!(contents(&forward), contents(&reverse));
}

#[tokio::test]
/// Stream items arrive in merge (node-name) order, not completion order,
/// and the final snapshot contains every dimension key.
async fn stream_order_and_completeness() {
    let (state, items) = run_fan_out([40, 30, 20, 10]).await;

    let order: Vec<&str> = items.iter().map(|e| e.node.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "a_entry",
            "w_compliance_risk",
            "w_market_demand",
            "w_quantifiability",
            "w_settlement",
            "z_join",
        ]
    );

    for dim in Dimension::ALL {
        assert_eq!(state.research_for(dim).len(), 1);
    }
    assert!(
        state
            .messages
            .iter()
            .any(|m| m.content == format!("joined {}", Dimension::ALL.len()))
    );
}

#[tokio::test]
/// Node emissions reach both the bus sinks and the registry queue.
async fn events_reach_both_sinks() {
    let memory = MemorySink::new();
    let bus = EventBus::with_sink(memory.clone());
    bus.listen_for_events();

    let registry = JobStatusRegistry::new();
    registry.get_or_create("job-s2");

    let scheduler = fan_out_graph([1, 1, 1, 1]);
    let (handle, _stream) = scheduler.spawn(
        AnalysisState::new("topic", "job-s2"),
        registry.clone(),
        bus.get_sender(),
    );
    handle.join().await.unwrap();
    bus.stop_listener().await;

    let from_bus = memory.snapshot();
    let from_registry = registry.snapshot("job-s2").unwrap().events;

    // Four writers, each emitting started + completed.
    let completed = |events: &[prospector::events::ProgressEvent]| {
        events
            .iter()
            .filter(|e| e.kind == ProgressKind::Completed)
            .count()
    };
    assert_eq!(completed(&from_bus), 4);
    assert_eq!(completed(&from_registry), 4);
    assert_eq!(from_bus.len(), from_registry.len());
}
