use async_trait::async_trait;
use tracing::{info, instrument};

use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::state::{StateSnapshot, StateUpdate};
use crate::types::Dimension;

/// Fan-in join after the analyzer wave.
///
/// The barrier merge has already combined the analyzers' collections by the
/// time this node runs; its job is the convergence bookkeeping: confirm
/// every dimension key is structurally present and record per-dimension
/// counts for observers.
#[derive(Default)]
pub struct CollectorNode;

impl CollectorNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node for CollectorNode {
    #[instrument(skip_all, fields(node = %ctx.node, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started("collecting analyzer output");

        let mut parts = Vec::with_capacity(Dimension::ALL.len());
        let mut total = 0;
        for dim in Dimension::ALL {
            if !snapshot.research.contains_key(&dim) {
                return Err(NodeError::MissingInput {
                    what: "dimension research collection",
                });
            }
            let count = snapshot.research_for(dim).len();
            total += count;
            parts.push(format!("{dim}={count}"));
        }

        let summary = format!("collected {total} documents ({})", parts.join(", "));
        info!(job_id = %ctx.job_id, %summary, "analyzer output collected");
        ctx.push_debug(summary.clone());
        ctx.emit_completed(summary.clone());

        Ok(StateUpdate::new().with_message(Message::system(&summary)))
    }
}
