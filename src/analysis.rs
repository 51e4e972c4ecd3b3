//! The caller-facing entry contract: request validation, pipeline assembly,
//! streaming runs, and the blocking convenience wrapper.
//!
//! [`FeasibilityPipeline::stream`] starts a run and hands back the lazy
//! `(node, snapshot)` sequence plus a handle on the final state.
//! [`FeasibilityPipeline::go`] drains that sequence, drives the optional
//! progress callback, and always returns a structured [`AnalysisOutcome`] —
//! it never lets an error escape, so a driver looping over many jobs can
//! continue past one failure.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::events::{EventBus, EventSink, ProgressEvent, ProgressKind, StateEvent, SYSTEM_NODE};
use crate::graph::{GraphBuilder, GraphDefinition, GraphDefinitionError};
use crate::nodes::{
    BriefingNode, CollectorNode, CuratorNode, EditorNode, EnricherNode, GroundingNode,
    ResearcherNode, researcher_name,
};
use crate::providers::{ChatProvider, SearchProvider};
use crate::registry::JobStatusRegistry;
use crate::scheduler::{RunHandle, WaveScheduler};
use crate::state::AnalysisState;
use crate::types::{Dimension, JobPhase};

/// Caller input for one analysis run.
#[derive(Clone, Debug, Default)]
pub struct AnalysisRequest {
    /// The event topic under analysis. Required, non-empty.
    pub topic: String,
    pub event_category: Option<String>,
    pub target_date: Option<String>,
    pub event_description: Option<String>,
    /// Caller-supplied job id; generated when absent.
    pub job_id: Option<String>,
}

impl AnalysisRequest {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_event_category(mut self, category: impl Into<String>) -> Self {
        self.event_category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_target_date(mut self, date: impl Into<String>) -> Self {
        self.target_date = Some(date.into());
        self
    }

    #[must_use]
    pub fn with_event_description(mut self, description: impl Into<String>) -> Self {
        self.event_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Malformed caller input, rejected before the graph is constructed.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("topic must be a non-empty string")]
    #[diagnostic(code(prospector::analysis::empty_topic))]
    EmptyTopic,
}

/// Failures raised when starting a run.
#[derive(Debug, Error, Diagnostic)]
pub enum StartError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphDefinitionError),
}

/// Coarse classification carried on failed outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Graph,
    Execution,
}

/// Handler invoked once per first-observed completion of each node, plus
/// synthetic [`SYSTEM_NODE`] events for overall start/completion/failure.
pub type ProgressCallback = Arc<dyn Fn(&str, ProgressKind, &str) + Send + Sync>;

/// A started run: the handle on the final state plus the lazy,
/// single-consumer output stream.
pub struct RunStream {
    pub job_id: String,
    pub handle: RunHandle,
    pub events: flume::Receiver<StateEvent>,
}

/// Structured result of a drained run. Always produced, success or not.
#[derive(Clone, Debug)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub job_id: String,
    pub topic: String,
    pub report: Option<String>,
    pub feasibility_score: Option<f64>,
    pub briefings: FxHashMap<Dimension, String>,
    pub references: Vec<String>,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl AnalysisOutcome {
    fn from_state(state: &AnalysisState, elapsed: Duration) -> Self {
        let report_ok = state.report.as_deref().is_some_and(|r| !r.trim().is_empty());
        Self {
            success: report_ok,
            job_id: state.job_id.clone(),
            topic: state.topic.clone(),
            report: state.report.clone(),
            feasibility_score: state.feasibility_score,
            briefings: state.briefings.clone(),
            references: state.references.clone(),
            elapsed,
            error: (!report_ok).then(|| "workflow completed but produced no report".to_string()),
            error_kind: (!report_ok).then_some(ErrorKind::Execution),
        }
    }

    fn from_error(
        job_id: String,
        topic: String,
        kind: ErrorKind,
        message: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            job_id,
            topic,
            report: None,
            feasibility_score: None,
            briefings: FxHashMap::default(),
            references: Vec::new(),
            elapsed,
            error: Some(message),
            error_kind: Some(kind),
        }
    }

    /// Registry payload recorded for successful runs.
    fn result_json(&self) -> serde_json::Value {
        let briefings: serde_json::Map<String, serde_json::Value> = Dimension::ALL
            .iter()
            .filter_map(|dim| {
                self.briefings
                    .get(dim)
                    .map(|text| (dim.as_str().to_string(), serde_json::json!(text)))
            })
            .collect();
        serde_json::json!({
            "topic": self.topic,
            "report": self.report,
            "feasibility_score": self.feasibility_score,
            "briefings": briefings,
            "references": self.references,
            "elapsed_secs": self.elapsed.as_secs_f64(),
        })
    }
}

/// The assembled analysis pipeline, reusable across runs.
///
/// Holds the provider seams, the injected [`JobStatusRegistry`], the run
/// configuration, and the progress [`EventBus`]. Each call to
/// [`stream`](Self::stream) or [`go`](Self::go) executes one independent
/// run of the static graph.
pub struct FeasibilityPipeline {
    chat: Arc<dyn ChatProvider>,
    search: Arc<dyn SearchProvider>,
    registry: JobStatusRegistry,
    config: RunConfig,
    bus: EventBus,
}

impl FeasibilityPipeline {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            chat,
            search,
            registry: JobStatusRegistry::new(),
            config: RunConfig::default(),
            bus: EventBus::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: JobStatusRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// Attach an additional progress sink (e.g., per-request streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.bus.add_sink(sink);
    }

    /// The registry handle shared with every node invocation.
    #[must_use]
    pub fn registry(&self) -> &JobStatusRegistry {
        &self.registry
    }

    fn build_graph(&self) -> Result<GraphDefinition, GraphDefinitionError> {
        let mut builder = GraphBuilder::new().add_node(
            "grounding",
            [] as [&str; 0],
            GroundingNode::new(self.search.clone(), self.config.search_results_per_query),
        );

        let mut researcher_names = Vec::with_capacity(Dimension::ALL.len());
        for dim in Dimension::ALL {
            let name = researcher_name(dim);
            builder = builder.add_node(
                name.clone(),
                ["grounding"],
                ResearcherNode::new(
                    dim,
                    self.chat.clone(),
                    self.search.clone(),
                    self.config.queries_per_dimension,
                    self.config.search_results_per_query,
                ),
            );
            researcher_names.push(name);
        }

        builder
            .add_node("collector", researcher_names, CollectorNode::new())
            .add_node(
                "curator",
                ["collector"],
                CuratorNode::new(self.config.curated_per_dimension),
            )
            .add_node("enricher", ["curator"], EnricherNode::new())
            .add_node(
                "briefing",
                ["enricher"],
                BriefingNode::new(self.chat.clone(), self.config.briefing_concurrency),
            )
            .add_node("editor", ["briefing"], EditorNode::new(self.chat.clone()))
            .compile()
    }

    /// Validate the request and start a run.
    ///
    /// Returns the lazy `(node, snapshot)` stream; the caller drains it for
    /// incremental state and joins the handle for the final state.
    #[instrument(skip_all, fields(topic = %request.topic))]
    pub fn stream(&self, request: AnalysisRequest) -> Result<RunStream, StartError> {
        if request.topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic.into());
        }

        let job_id = request.job_id.clone().unwrap_or_else(generate_job_id);

        let graph = self.build_graph()?;

        self.registry.get_or_create(&job_id);
        self.registry.set_phase(&job_id, JobPhase::Running);
        self.bus.listen_for_events();
        let sender = self.bus.get_sender();

        let started = ProgressEvent::system(
            ProgressKind::Started,
            format!("analysis started for '{}'", request.topic.trim()),
        );
        self.registry.append_event(&job_id, started.clone());
        let _ = sender.send(started);

        let initial = AnalysisState::new(request.topic.trim(), job_id.clone())
            .with_event_category(request.event_category)
            .with_target_date(request.target_date)
            .with_event_description(request.event_description);

        info!(job_id = %job_id, "starting analysis run");
        let scheduler = WaveScheduler::new(graph);
        let (handle, events) = scheduler.spawn(initial, self.registry.clone(), sender);

        Ok(RunStream {
            job_id,
            handle,
            events,
        })
    }

    /// Run to completion and return the structured outcome.
    ///
    /// Drains the stream, invoking `on_progress` once per first-observed
    /// node completion and for synthetic system events. Every failure mode
    /// is converted into a failed [`AnalysisOutcome`] with an error kind,
    /// message, and elapsed time.
    pub async fn go(
        &self,
        request: AnalysisRequest,
        on_progress: Option<ProgressCallback>,
    ) -> AnalysisOutcome {
        let started_at = Instant::now();
        let fallback_job_id = request.job_id.clone().unwrap_or_default();
        let topic = request.topic.clone();

        let run = match self.stream(request) {
            Ok(run) => run,
            Err(err) => {
                let kind = match &err {
                    StartError::Validation(_) => ErrorKind::Validation,
                    StartError::Graph(_) => ErrorKind::Graph,
                };
                warn!(error = %err, "analysis rejected before execution");
                notify(&on_progress, SYSTEM_NODE, ProgressKind::Error, &err.to_string());
                return AnalysisOutcome::from_error(
                    fallback_job_id,
                    topic,
                    kind,
                    err.to_string(),
                    started_at.elapsed(),
                );
            }
        };

        notify(
            &on_progress,
            SYSTEM_NODE,
            ProgressKind::Started,
            "analysis started",
        );

        let mut completed: FxHashSet<String> = FxHashSet::default();
        while let Ok(event) = run.events.recv_async().await {
            if completed.insert(event.node.clone()) {
                notify(
                    &on_progress,
                    &event.node,
                    ProgressKind::Completed,
                    &format!("{} completed", event.node),
                );
            }
        }

        match run.handle.join().await {
            Ok(state) => {
                let outcome = AnalysisOutcome::from_state(&state, started_at.elapsed());
                if outcome.success {
                    self.registry.set_result(&run.job_id, outcome.result_json());
                    self.record_system_event(
                        &run.job_id,
                        ProgressKind::Completed,
                        "analysis completed",
                    );
                    notify(
                        &on_progress,
                        SYSTEM_NODE,
                        ProgressKind::Completed,
                        "analysis completed",
                    );
                } else {
                    let message = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "analysis failed".to_string());
                    self.registry.set_error(&run.job_id, &message);
                    self.record_system_event(&run.job_id, ProgressKind::Error, &message);
                    notify(&on_progress, SYSTEM_NODE, ProgressKind::Error, &message);
                }
                outcome
            }
            Err(err) => {
                let message = err.to_string();
                self.registry.set_error(&run.job_id, &message);
                self.record_system_event(&run.job_id, ProgressKind::Error, &message);
                notify(&on_progress, SYSTEM_NODE, ProgressKind::Error, &message);
                AnalysisOutcome::from_error(
                    run.job_id,
                    topic,
                    ErrorKind::Execution,
                    message,
                    started_at.elapsed(),
                )
            }
        }
    }

    fn record_system_event(&self, job_id: &str, kind: ProgressKind, message: &str) {
        let event = ProgressEvent::system(kind, message);
        self.registry.append_event(job_id, event.clone());
        let _ = self.bus.get_sender().send(event);
    }
}

/// Invoke the caller's progress callback. A panicking observer must never
/// take the run down with it, so unwinds are caught and logged.
fn notify(callback: &Option<ProgressCallback>, node: &str, kind: ProgressKind, message: &str) {
    if let Some(cb) = callback {
        if catch_unwind(AssertUnwindSafe(|| cb(node, kind, message))).is_err() {
            warn!(node, kind = kind.as_str(), "progress callback panicked; continuing");
        }
    }
}

/// Job ids are a short hex suffix on a stable prefix, e.g.
/// `analysis-3f9c2a81d04e`.
fn generate_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("analysis-{}", &suffix[..12])
}
