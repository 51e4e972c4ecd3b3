use async_trait::async_trait;
use tracing::instrument;

use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::state::{StateSnapshot, StateUpdate};
use crate::types::Dimension;

/// Builds the deduplicated reference list from the curated collections.
///
/// References are source URLs, lexicographically ordered, one entry per
/// unique URL across all dimensions.
#[derive(Default)]
pub struct EnricherNode;

impl EnricherNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for EnricherNode {
    #[instrument(skip_all, fields(node = %ctx.node, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started("building references");

        let mut references: Vec<String> = Vec::new();
        for dim in Dimension::ALL {
            for url in snapshot.curated_for(dim).urls() {
                references.push(url.to_string());
            }
        }
        references.sort_unstable();
        references.dedup();

        let count = references.len();
        ctx.emit_completed(format!("{count} references collected"));
        Ok(StateUpdate::new()
            .with_references(references)
            .with_message(Message::system(&format!(
                "enrichment complete: {count} references"
            ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::registry::JobStatusRegistry;
    use crate::state::AnalysisState;

    fn ctx() -> NodeContext {
        let (tx, _rx) = flume::unbounded();
        NodeContext::new("enricher", 4, "job-e", tx, JobStatusRegistry::new())
    }

    #[tokio::test]
    /// References are deduplicated across dimensions and sorted.
    async fn dedups_across_dimensions() {
        let mut state = AnalysisState::new("topic", "job-e");
        state.apply(
            &StateUpdate::new()
                .with_curated(
                    Dimension::Settlement,
                    vec![
                        Document::new("https://shared", "s", "c").with_score(0.5),
                        Document::new("https://b", "b", "c").with_score(0.4),
                    ]
                    .into(),
                )
                .with_curated(
                    Dimension::MarketDemand,
                    vec![
                        Document::new("https://shared", "s", "c").with_score(0.7),
                        Document::new("https://a", "a", "c").with_score(0.6),
                    ]
                    .into(),
                ),
        );

        let update = EnricherNode::new().run(state.snapshot(), ctx()).await.unwrap();
        assert_eq!(
            update.references.unwrap(),
            vec![
                "https://a".to_string(),
                "https://b".to_string(),
                "https://shared".to_string(),
            ]
        );
    }
}
