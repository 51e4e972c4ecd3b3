use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::providers::SearchProvider;
use crate::state::{StateSnapshot, StateUpdate};

/// Entry stage: one background search on the raw topic.
///
/// Seeds the `background` document set every later stage can draw context
/// from. A failed background search is fatal: without grounding, the
/// analyzers would all run blind against the bare topic string.
pub struct GroundingNode {
    search: Arc<dyn SearchProvider>,
    results_per_query: usize,
}

impl GroundingNode {
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>, results_per_query: usize) -> Self {
        Self {
            search,
            results_per_query,
        }
    }
}

#[async_trait]
impl Node for GroundingNode {
    #[instrument(skip_all, fields(node = %ctx.node, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started(format!("grounding topic: {}", snapshot.topic));

        let mut query = snapshot.topic.clone();
        if let Some(description) = &snapshot.event_description {
            query.push(' ');
            query.push_str(description);
        }

        let docs = self.search.search(&query, self.results_per_query).await?;
        let count = docs.len();
        ctx.push_debug(format!("grounding search returned {count} documents"));

        let background = docs
            .into_iter()
            .map(|d| d.with_query(query.clone()))
            .collect();

        ctx.emit_completed(format!("grounding complete: {count} background documents"));
        Ok(StateUpdate::new()
            .with_background(background)
            .with_message(Message::system(&format!(
                "grounding complete: {count} background documents for '{}'",
                snapshot.topic
            ))))
    }
}
