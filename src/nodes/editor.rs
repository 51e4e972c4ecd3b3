use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::providers::ChatProvider;
use crate::state::{StateSnapshot, StateUpdate};
use crate::types::Dimension;

const EDITOR_PROMPT: &str = "You compile dimension briefings into one feasibility report \
for a potential event market. Keep each provided dimension as its own labeled section. \
End your answer with a line 'SCORE: <0-100>' giving the overall feasibility score.";

/// Terminal stage: compiles the briefings into the final report.
///
/// Sections cover only the dimensions that produced a non-empty briefing.
/// The report is streamed back out as chunk events, split at sentence
/// boundaries, before the terminal update is returned. The feasibility
/// score comes from the provider's trailing `SCORE:` line when present,
/// otherwise from the share of dimensions with material.
pub struct EditorNode {
    chat: Arc<dyn ChatProvider>,
}

impl EditorNode {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Node for EditorNode {
    #[instrument(skip_all, fields(node = %ctx.node, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started("compiling final report");

        if snapshot.briefings.len() < Dimension::ALL.len() {
            return Err(NodeError::MissingInput {
                what: "dimension briefings",
            });
        }

        let mut user = format!("Topic: {}\n\n", snapshot.topic);
        let mut with_material = 0usize;
        for dim in Dimension::ALL {
            match snapshot.briefing_for(dim) {
                Some(text) if !text.is_empty() => {
                    with_material += 1;
                    user.push_str(&format!("## {}\n{text}\n\n", dim.label()));
                }
                _ => {}
            }
        }

        let raw = self.chat.complete(EDITOR_PROMPT, &user).await?;
        let (report, parsed_score) = extract_score(&raw);
        if report.is_empty() {
            return Err(NodeError::UnusableResponse {
                stage: "editor",
                reason: "provider returned an empty report".into(),
            });
        }

        let score = parsed_score.unwrap_or_else(|| {
            100.0 * with_material as f64 / Dimension::ALL.len() as f64
        });

        for sentence in split_sentences(&report) {
            ctx.emit_chunk(sentence);
        }

        ctx.emit_completed(format!("report compiled, feasibility score {score:.0}"));
        Ok(StateUpdate::new()
            .with_report(report)
            .with_feasibility_score(score)
            .with_message(Message::assistant(&format!(
                "report compiled covering {with_material} dimensions"
            ))))
    }
}

/// Split `SCORE: <n>` off the report tail, if the provider appended one.
fn extract_score(raw: &str) -> (String, Option<f64>) {
    let trimmed = raw.trim();
    if let Some((body, last)) = trimmed.rsplit_once('\n') {
        if let Some(value) = last.trim().strip_prefix("SCORE:") {
            if let Ok(score) = value.trim().parse::<f64>() {
                return (body.trim_end().to_string(), Some(score.clamp(0.0, 100.0)));
            }
        }
    }
    if let Some(value) = trimmed.strip_prefix("SCORE:") {
        if let Ok(score) = value.trim().parse::<f64>() {
            return (String::new(), Some(score.clamp(0.0, 100.0)));
        }
    }
    (trimmed.to_string(), None)
}

/// Split text into sentence-sized chunks at `.`, `!`, `?` boundaries,
/// keeping the terminator with its sentence. Newlines also delimit.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '\n' {
            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::registry::JobStatusRegistry;
    use crate::state::AnalysisState;

    struct ScriptedChat(&'static str);

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn ctx_with_channel() -> (NodeContext, flume::Receiver<crate::events::ProgressEvent>) {
        let (tx, rx) = flume::unbounded();
        (
            NodeContext::new("editor", 6, "job-ed", tx, JobStatusRegistry::new()),
            rx,
        )
    }

    fn briefed_state() -> AnalysisState {
        let mut state = AnalysisState::new("topic", "job-ed");
        state.apply(
            &StateUpdate::new()
                .with_briefing(Dimension::Quantifiability, "measurable")
                .with_briefing(Dimension::Settlement, "oracle exists")
                .with_briefing(Dimension::MarketDemand, "")
                .with_briefing(Dimension::ComplianceRisk, "low risk"),
        );
        state
    }

    #[tokio::test]
    /// The provider's SCORE line is parsed and stripped from the report.
    async fn parses_score_line() {
        let node = EditorNode::new(Arc::new(ScriptedChat(
            "Feasible market. Good oracle.\nSCORE: 82",
        )));
        let (ctx, rx) = ctx_with_channel();
        let update = node.run(briefed_state().snapshot(), ctx).await.unwrap();

        assert_eq!(update.feasibility_score, Some(82.0));
        let report = update.report.unwrap();
        assert!(!report.contains("SCORE"));

        // Chunks were streamed at sentence boundaries.
        let chunks: Vec<_> = rx
            .drain()
            .filter(|e| e.kind == crate::events::ProgressKind::Chunk)
            .collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].message, "Feasible market.");
    }

    #[tokio::test]
    /// Without a SCORE line the score falls back to dimension coverage.
    async fn fallback_score_from_coverage() {
        let node = EditorNode::new(Arc::new(ScriptedChat("Report body without score line.")));
        let (ctx, _rx) = ctx_with_channel();
        let update = node.run(briefed_state().snapshot(), ctx).await.unwrap();
        // 3 of 4 dimensions had material.
        assert_eq!(update.feasibility_score, Some(75.0));
    }

    #[tokio::test]
    /// Missing briefings are a structural failure, not an empty report.
    async fn missing_briefings_rejected() {
        let node = EditorNode::new(Arc::new(ScriptedChat("irrelevant")));
        let (ctx, _rx) = ctx_with_channel();
        let state = AnalysisState::new("topic", "job-ed");
        let err = node.run(state.snapshot(), ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::MissingInput { .. }));
    }

    #[tokio::test]
    /// An empty report body from the provider is unusable.
    async fn empty_report_rejected() {
        let node = EditorNode::new(Arc::new(ScriptedChat("SCORE: 50")));
        let (ctx, _rx) = ctx_with_channel();
        let err = node.run(briefed_state().snapshot(), ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::UnusableResponse { .. }));
    }

    #[test]
    fn sentence_splitting() {
        assert_eq!(
            split_sentences("One. Two! Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("Line one\nLine two."), vec![
            "Line one",
            "Line two."
        ]);
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn score_extraction() {
        assert_eq!(extract_score("body\nSCORE: 90"), ("body".into(), Some(90.0)));
        assert_eq!(extract_score("body only"), ("body only".into(), None));
        assert_eq!(
            extract_score("body\nSCORE: 150"),
            ("body".into(), Some(100.0))
        );
    }
}
