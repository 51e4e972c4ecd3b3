use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::providers::ChatProvider;
use crate::state::{StateSnapshot, StateUpdate};
use crate::types::Dimension;

const BRIEFING_PROMPT: &str = "You write a short feasibility briefing for one analysis \
dimension of a potential event market, based only on the documents provided. Be factual \
and concise.";

/// Writes one briefing per dimension, in parallel under a concurrency cap.
///
/// Every declared dimension receives a slot: a dimension with no curated
/// documents gets an empty string without a provider call, so callers may
/// rely on the key being present after this wave. A provider failure for a
/// dimension that does have documents is fatal.
pub struct BriefingNode {
    chat: Arc<dyn ChatProvider>,
    concurrency: usize,
}

impl BriefingNode {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatProvider>, concurrency: usize) -> Self {
        Self { chat, concurrency }
    }

    fn briefing_prompt(snapshot: &StateSnapshot, dim: Dimension) -> String {
        let mut user = format!(
            "Topic: {}\nDimension: {}\nDocuments:\n",
            snapshot.topic,
            dim.label()
        );
        for doc in snapshot.curated_for(dim).ranked() {
            user.push_str(&format!("- {} ({})\n  {}\n", doc.title, doc.url, doc.content));
        }
        user
    }
}

#[async_trait]
impl Node for BriefingNode {
    #[instrument(skip_all, fields(node = %ctx.node, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started("writing dimension briefings");

        let limiter = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let tasks = Dimension::ALL.map(|dim| {
            let chat = self.chat.clone();
            let limiter = limiter.clone();
            let ctx = ctx.clone();
            let snapshot = snapshot.clone();
            async move {
                if snapshot.curated_for(dim).is_empty() {
                    ctx.emit_progress(format!("{dim}: no documents, empty briefing"));
                    return (dim, Ok(String::new()));
                }
                let permit = limiter.acquire_owned().await.ok();
                let outcome = chat
                    .complete(BRIEFING_PROMPT, &Self::briefing_prompt(&snapshot, dim))
                    .await;
                drop(permit);
                if outcome.is_ok() {
                    ctx.emit_progress(format!("{dim}: briefing complete"));
                }
                (dim, outcome)
            }
        });

        let mut update = StateUpdate::new();
        let mut written = 0;
        for (dim, outcome) in join_all(tasks).await {
            match outcome {
                Ok(text) => {
                    if !text.is_empty() {
                        written += 1;
                    }
                    update = update.with_briefing(dim, text);
                }
                Err(e) => {
                    ctx.emit_error(format!("{dim}: briefing failed: {e}"));
                    return Err(NodeError::Provider(e));
                }
            }
        }

        ctx.emit_completed(format!("{written} briefings written"));
        Ok(update.with_message(Message::system(&format!(
            "briefing complete: {written} of {} dimensions had material",
            Dimension::ALL.len()
        ))))
    }
}
