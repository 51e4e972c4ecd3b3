//! Concrete node bodies for the feasibility analysis pipeline.
//!
//! Stage order: [`GroundingNode`] → four [`ResearcherNode`]s (one per
//! [`Dimension`](crate::types::Dimension), concurrent) → [`CollectorNode`]
//! (join) → [`CuratorNode`] → [`EnricherNode`] → [`BriefingNode`] →
//! [`EditorNode`] (terminal). All external calls go through the
//! [`providers`](crate::providers) trait seams, so every body here is
//! testable with deterministic fakes.

mod briefing;
mod collector;
mod curator;
mod editor;
mod enricher;
mod grounding;
mod researcher;

pub use briefing::BriefingNode;
pub use collector::CollectorNode;
pub use curator::CuratorNode;
pub use editor::{EditorNode, split_sentences};
pub use enricher::EnricherNode;
pub use grounding::GroundingNode;
pub use researcher::{ResearcherNode, researcher_name};
