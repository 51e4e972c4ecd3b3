//! Prospector: a wave-scheduled DAG engine for event feasibility analysis.
//!
//! The engine runs a statically defined analysis graph over one input
//! topic: a grounding stage, four concurrent dimension analyzers, a
//! convergence join, then sequential curation, enrichment, briefing, and
//! final report compilation. Its pieces:
//!
//! - [`graph`]: graph definition, validation, and topological wave layering
//! - [`scheduler`]: concurrent wave execution with deterministic barrier
//!   merges and a lazy per-node output stream
//! - [`state`]: the typed analysis state, snapshots, and merge rules
//! - [`node`]: the node execution contract
//! - [`events`]: progress events, the event bus, and pluggable sinks
//! - [`registry`]: the process-wide, pollable job status registry
//! - [`nodes`]: the concrete pipeline stage bodies
//! - [`analysis`]: the caller-facing entry contract
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use prospector::analysis::{AnalysisRequest, FeasibilityPipeline};
//! # use prospector::providers::{ChatProvider, SearchProvider};
//! # async fn example(chat: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) {
//!
//! let pipeline = FeasibilityPipeline::new(chat, search);
//! let outcome = pipeline
//!     .go(AnalysisRequest::new("Will X win Y"), None)
//!     .await;
//!
//! if outcome.success {
//!     println!("score: {:?}", outcome.feasibility_score);
//! }
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod document;
pub mod events;
pub mod graph;
pub mod message;
pub mod node;
pub mod nodes;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod telemetry;
pub mod types;
