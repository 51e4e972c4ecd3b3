//! Typed analysis state, immutable snapshots, and the barrier merge rules.
//!
//! The state is a fixed set of named fields rather than a loose key-value
//! map: every key a node may write is declared here, with its merge policy
//! baked into [`AnalysisState::apply`]. Nodes receive a read-only
//! [`StateSnapshot`] and return a [`StateUpdate`]; only the scheduler holds
//! the authoritative [`AnalysisState`], and only it merges, single-threaded,
//! between waves.
//!
//! # Merge policy by field
//!
//! | Field | Policy |
//! |-------|--------|
//! | `messages` | append, ordered, duplicates allowed |
//! | `background`, `research[dim]`, `curated[dim]` | union by URL, highest score wins, ties keep earliest |
//! | `briefings[dim]` | per-dimension insert; empty string is a legal value |
//! | `references` | last writer wins (single producer) |
//! | `topic`, `feasibility_score`, `report`, job fields | last writer wins |
//!
//! # Examples
//!
//! ```
//! use prospector::state::{AnalysisState, StateUpdate};
//! use prospector::message::Message;
//!
//! let mut state = AnalysisState::new("Will X win Y", "analysis-abc123");
//! let update = StateUpdate::new()
//!     .with_message(Message::system("grounding complete"))
//!     .with_report("final report text");
//! state.apply(&update);
//!
//! assert_eq!(state.messages.len(), 1);
//! assert_eq!(state.report.as_deref(), Some("final report text"));
//! ```

use std::ops::Deref;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::document::DocumentSet;
use crate::message::Message;
use crate::types::Dimension;

/// The authoritative, evolving state of one analysis run.
///
/// Created seeded with the job's input fields; mutated only through
/// [`apply`](Self::apply). Every dimension-scoped collection is present from
/// construction (empty, never absent), so downstream stages may index by
/// [`Dimension`] without presence checks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisState {
    pub topic: String,
    pub event_category: Option<String>,
    pub target_date: Option<String>,
    pub event_description: Option<String>,
    pub job_id: String,

    /// Running log of stage announcements and provider notes.
    pub messages: Vec<Message>,
    /// Background documents from the grounding stage.
    pub background: DocumentSet,
    /// Raw research per dimension, written by that dimension's analyzer only.
    pub research: FxHashMap<Dimension, DocumentSet>,
    /// Curated subset per dimension.
    pub curated: FxHashMap<Dimension, DocumentSet>,
    /// Deduplicated source URLs across curated collections.
    pub references: Vec<String>,
    /// Briefing text per dimension; empty string when a dimension had no data.
    pub briefings: FxHashMap<Dimension, String>,
    pub feasibility_score: Option<f64>,
    /// The final compiled report.
    pub report: Option<String>,
}

impl AnalysisState {
    #[must_use]
    pub fn new(topic: impl Into<String>, job_id: impl Into<String>) -> Self {
        let mut research = FxHashMap::default();
        let mut curated = FxHashMap::default();
        for dim in Dimension::ALL {
            research.insert(dim, DocumentSet::new());
            curated.insert(dim, DocumentSet::new());
        }
        Self {
            topic: topic.into(),
            event_category: None,
            target_date: None,
            event_description: None,
            job_id: job_id.into(),
            messages: Vec::new(),
            background: DocumentSet::new(),
            research,
            curated,
            references: Vec::new(),
            briefings: FxHashMap::default(),
            feasibility_score: None,
            report: None,
        }
    }

    #[must_use]
    pub fn with_event_category(mut self, category: Option<String>) -> Self {
        self.event_category = category;
        self
    }

    #[must_use]
    pub fn with_target_date(mut self, date: Option<String>) -> Self {
        self.target_date = date;
        self
    }

    #[must_use]
    pub fn with_event_description(mut self, description: Option<String>) -> Self {
        self.event_description = description;
        self
    }

    /// Raw research for one dimension. Present from construction.
    #[must_use]
    pub fn research_for(&self, dim: Dimension) -> &DocumentSet {
        static EMPTY: std::sync::OnceLock<DocumentSet> = std::sync::OnceLock::new();
        self.research
            .get(&dim)
            .unwrap_or_else(|| EMPTY.get_or_init(DocumentSet::new))
    }

    /// Curated documents for one dimension. Present from construction.
    #[must_use]
    pub fn curated_for(&self, dim: Dimension) -> &DocumentSet {
        static EMPTY: std::sync::OnceLock<DocumentSet> = std::sync::OnceLock::new();
        self.curated
            .get(&dim)
            .unwrap_or_else(|| EMPTY.get_or_init(DocumentSet::new))
    }

    /// Briefing text for one dimension, if the briefing wave has run.
    #[must_use]
    pub fn briefing_for(&self, dim: Dimension) -> Option<&str> {
        self.briefings.get(&dim).map(String::as_str)
    }

    /// Merge one partial update into this state under the per-field policy.
    pub fn apply(&mut self, update: &StateUpdate) {
        if let Some(messages) = &update.messages {
            self.messages.extend(messages.iter().cloned());
        }
        if let Some(background) = &update.background {
            self.background.merge(background);
        }
        if let Some(research) = &update.research {
            for (dim, docs) in research {
                self.research.entry(*dim).or_default().merge(docs);
            }
        }
        if let Some(curated) = &update.curated {
            for (dim, docs) in curated {
                self.curated.entry(*dim).or_default().merge(docs);
            }
        }
        if let Some(references) = &update.references {
            self.references = references.clone();
        }
        if let Some(briefings) = &update.briefings {
            for (dim, text) in briefings {
                self.briefings.insert(*dim, text.clone());
            }
        }
        if let Some(score) = update.feasibility_score {
            self.feasibility_score = Some(score);
        }
        if let Some(report) = &update.report {
            self.report = Some(report.clone());
        }
    }

    /// Produce the immutable snapshot handed to a wave's nodes.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            inner: Arc::new(self.clone()),
        }
    }
}

/// Read-only view of the state at a wave boundary.
///
/// Cheap to clone (shared Arc). Derefs to [`AnalysisState`], so fields read
/// directly: `snapshot.topic`, `snapshot.research_for(dim)`.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    inner: Arc<AnalysisState>,
}

impl Serialize for StateSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl Deref for StateSnapshot {
    type Target = AnalysisState;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl StateSnapshot {
    /// Owned copy of the underlying state, for callers that outlive the run.
    #[must_use]
    pub fn to_owned_state(&self) -> AnalysisState {
        (*self.inner).clone()
    }
}

/// Partial state produced by one node invocation.
///
/// All fields optional; a node sets only what it contractually writes.
/// Built fluently, mirroring how node bodies accumulate their output.
#[derive(Clone, Debug, Default)]
pub struct StateUpdate {
    pub messages: Option<Vec<Message>>,
    pub background: Option<DocumentSet>,
    pub research: Option<FxHashMap<Dimension, DocumentSet>>,
    pub curated: Option<FxHashMap<Dimension, DocumentSet>>,
    pub references: Option<Vec<String>>,
    pub briefings: Option<FxHashMap<Dimension, String>>,
    pub feasibility_score: Option<f64>,
    pub report: Option<String>,
}

impl StateUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.get_or_insert_with(Vec::new).push(message);
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_background(mut self, docs: DocumentSet) -> Self {
        self.background = Some(docs);
        self
    }

    #[must_use]
    pub fn with_research(mut self, dim: Dimension, docs: DocumentSet) -> Self {
        self.research
            .get_or_insert_with(FxHashMap::default)
            .insert(dim, docs);
        self
    }

    #[must_use]
    pub fn with_curated(mut self, dim: Dimension, docs: DocumentSet) -> Self {
        self.curated
            .get_or_insert_with(FxHashMap::default)
            .insert(dim, docs);
        self
    }

    #[must_use]
    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = Some(references);
        self
    }

    #[must_use]
    pub fn with_briefing(mut self, dim: Dimension, text: impl Into<String>) -> Self {
        self.briefings
            .get_or_insert_with(FxHashMap::default)
            .insert(dim, text.into());
        self
    }

    #[must_use]
    pub fn with_feasibility_score(mut self, score: f64) -> Self {
        self.feasibility_score = Some(score);
        self
    }

    #[must_use]
    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }

    /// True when the update carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_none()
            && self.background.is_none()
            && self.research.is_none()
            && self.curated.is_none()
            && self.references.is_none()
            && self.briefings.is_none()
            && self.feasibility_score.is_none()
            && self.report.is_none()
    }
}
