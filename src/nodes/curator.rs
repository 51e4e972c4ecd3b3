use async_trait::async_trait;
use tracing::instrument;

use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::state::{StateSnapshot, StateUpdate};
use crate::types::Dimension;

/// Keeps the highest-scored documents per dimension.
///
/// Writes a curated collection for every dimension, empty when the raw
/// research was empty, so downstream stages can index by dimension without
/// presence checks.
pub struct CuratorNode {
    keep_per_dimension: usize,
}

impl CuratorNode {
    #[must_use]
    pub fn new(keep_per_dimension: usize) -> Self {
        Self { keep_per_dimension }
    }
}

#[async_trait]
impl Node for CuratorNode {
    #[instrument(skip_all, fields(node = %ctx.node, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started("curating research");

        let mut update = StateUpdate::new();
        let mut kept = 0;
        for dim in Dimension::ALL {
            let curated = snapshot.research_for(dim).top(self.keep_per_dimension);
            kept += curated.len();
            ctx.emit_progress(format!("{dim}: kept {} documents", curated.len()));
            update = update.with_curated(dim, curated);
        }

        ctx.emit_completed(format!("curated {kept} documents"));
        Ok(update.with_message(Message::system(&format!(
            "curation complete: {kept} documents retained"
        ))))
    }
}
