use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{instrument, warn};

use crate::document::DocumentSet;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError};
use crate::providers::{ChatProvider, SearchProvider};
use crate::state::{StateSnapshot, StateUpdate};
use crate::types::Dimension;

const QUERY_PROMPT: &str = "You generate web search queries for analyzing whether an event \
is feasible as a tradeable market. Answer with one query per line and nothing else.";

/// Graph node name for a dimension's researcher.
#[must_use]
pub fn researcher_name(dim: Dimension) -> String {
    format!("research_{dim}")
}

/// Fan-out analyzer for one dimension.
///
/// Generates search queries through the chat provider, runs them in
/// parallel, and folds the results into this dimension's research
/// collection. Sub-failures are downgraded as far as the data allows: a
/// failed query generation falls back to the bare topic, and individual
/// failed searches are skipped as long as at least one query succeeds. Only
/// when every search call fails does the node escalate.
pub struct ResearcherNode {
    dim: Dimension,
    chat: Arc<dyn ChatProvider>,
    search: Arc<dyn SearchProvider>,
    queries_per_dimension: usize,
    results_per_query: usize,
}

impl ResearcherNode {
    #[must_use]
    pub fn new(
        dim: Dimension,
        chat: Arc<dyn ChatProvider>,
        search: Arc<dyn SearchProvider>,
        queries_per_dimension: usize,
        results_per_query: usize,
    ) -> Self {
        Self {
            dim,
            chat,
            search,
            queries_per_dimension,
            results_per_query,
        }
    }

    async fn generate_queries(&self, snapshot: &StateSnapshot, ctx: &NodeContext) -> Vec<String> {
        let mut user = format!(
            "Topic: {}\nDimension under analysis: {}\n",
            snapshot.topic,
            self.dim.label()
        );
        if let Some(category) = &snapshot.event_category {
            user.push_str(&format!("Category: {category}\n"));
        }
        if let Some(date) = &snapshot.target_date {
            user.push_str(&format!("Target date: {date}\n"));
        }
        if let Some(description) = &snapshot.event_description {
            user.push_str(&format!("Description: {description}\n"));
        }
        user.push_str(&format!(
            "Produce {} search queries.",
            self.queries_per_dimension
        ));

        match self.chat.complete(QUERY_PROMPT, &user).await {
            Ok(text) => {
                let queries: Vec<String> = text
                    .lines()
                    .map(strip_list_marker)
                    .filter(|line| !line.is_empty())
                    .take(self.queries_per_dimension)
                    .map(str::to_string)
                    .collect();
                if queries.is_empty() {
                    vec![snapshot.topic.clone()]
                } else {
                    queries
                }
            }
            Err(e) => {
                // Query generation is non-essential; fall back to the topic.
                warn!(dimension = %self.dim, error = %e, "query generation failed, using topic");
                ctx.push_debug(format!("{}: query generation failed: {e}", self.dim));
                vec![snapshot.topic.clone()]
            }
        }
    }
}

/// Strip a bullet or `1.`/`1)` list marker from a generated query line.
///
/// Only a marker followed by whitespace is removed, so a query that merely
/// starts with a number (`"2024 election odds"`) is left intact.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*']).trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            if rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    line
}

#[async_trait]
impl Node for ResearcherNode {
    #[instrument(skip_all, fields(node = %ctx.node, dimension = %self.dim, job_id = %ctx.job_id))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<StateUpdate, NodeError> {
        ctx.emit_started(format!("analyzing {}", self.dim.label()));

        let queries = self.generate_queries(&snapshot, &ctx).await;
        ctx.emit_progress(format!(
            "{}: generated {} queries",
            self.dim,
            queries.len()
        ));

        let searches = queries.iter().map(|query| {
            let search = self.search.clone();
            let query = query.clone();
            let results = self.results_per_query;
            async move {
                let outcome = search.search(&query, results).await;
                (query, outcome)
            }
        });

        let mut docs = DocumentSet::new();
        let mut failures = Vec::new();
        for (query, outcome) in join_all(searches).await {
            match outcome {
                Ok(results) => {
                    ctx.emit_progress(format!(
                        "{}: search '{query}' returned {} documents",
                        self.dim,
                        results.len()
                    ));
                    for doc in results {
                        docs.insert(doc.with_query(query.clone()));
                    }
                }
                Err(e) => {
                    warn!(dimension = %self.dim, query = %query, error = %e, "search failed");
                    ctx.push_debug(format!("{}: search '{query}' failed: {e}", self.dim));
                    failures.push(e);
                }
            }
        }

        // Partial failures ride along with whatever succeeded; a dimension
        // whose every search call failed has no usable data and escalates.
        if docs.is_empty() && !failures.is_empty() {
            ctx.emit_error(format!("{}: all searches failed", self.dim));
            return Err(NodeError::Provider(failures.remove(0)));
        }

        let count = docs.len();
        ctx.emit_completed(format!("{}: {count} documents collected", self.dim));
        Ok(StateUpdate::new()
            .with_research(self.dim, docs)
            .with_message(Message::system(&format!(
                "{} research: {count} documents",
                self.dim
            ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
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

    struct FailingChat;

    #[async_trait]
    impl ChatProvider for FailingChat {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Unavailable {
                provider: "chat",
                message: "down".into(),
            })
        }
    }

    struct EchoSearch;

    #[async_trait]
    impl SearchProvider for EchoSearch {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<Document>, ProviderError> {
            Ok(vec![
                Document::new(format!("https://{}", query.replace(' ', "-")), query, "body")
                    .with_score(0.5),
            ])
        }
    }

    struct DownSearch;

    #[async_trait]
    impl SearchProvider for DownSearch {
        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<Document>, ProviderError> {
            Err(ProviderError::Unavailable {
                provider: "search",
                message: "offline".into(),
            })
        }
    }

    fn ctx() -> NodeContext {
        let (tx, _rx) = flume::unbounded();
        NodeContext::new("research_settlement", 1, "job-r", tx, JobStatusRegistry::new())
    }

    fn node(chat: Arc<dyn ChatProvider>, search: Arc<dyn SearchProvider>) -> ResearcherNode {
        ResearcherNode::new(Dimension::Settlement, chat, search, 2, 5)
    }

    #[tokio::test]
    /// Generated queries each produce documents under the dimension's key.
    async fn folds_parallel_searches() {
        let n = node(
            Arc::new(ScriptedChat("first query\nsecond query\nthird ignored")),
            Arc::new(EchoSearch),
        );
        let state = AnalysisState::new("topic", "job-r");
        let update = n.run(state.snapshot(), ctx()).await.unwrap();

        let research = update.research.unwrap();
        let docs = research.get(&Dimension::Settlement).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.contains("https://first-query"));
    }

    #[tokio::test]
    /// Numbered query lists are cleaned before use.
    async fn strips_numbering() {
        let n = node(
            Arc::new(ScriptedChat("1. alpha query\n2. beta query")),
            Arc::new(EchoSearch),
        );
        let state = AnalysisState::new("topic", "job-r");
        let update = n.run(state.snapshot(), ctx()).await.unwrap();
        let research = update.research.unwrap();
        let docs = research.get(&Dimension::Settlement).unwrap();
        assert!(docs.contains("https://alpha-query"));
        assert!(docs.contains("https://beta-query"));
    }

    #[tokio::test]
    /// A query that merely starts with a number keeps its leading digits;
    /// only an actual list marker is removed.
    async fn year_prefixed_query_kept_intact() {
        let n = node(
            Arc::new(ScriptedChat("2024 election odds\n2) 2025 forecast")),
            Arc::new(EchoSearch),
        );
        let state = AnalysisState::new("topic", "job-r");
        let update = n.run(state.snapshot(), ctx()).await.unwrap();
        let research = update.research.unwrap();
        let docs = research.get(&Dimension::Settlement).unwrap();
        assert!(docs.contains("https://2024-election-odds"));
        assert!(docs.contains("https://2025-forecast"));
    }

    #[test]
    fn list_marker_stripping() {
        assert_eq!(strip_list_marker("1. alpha"), "alpha");
        assert_eq!(strip_list_marker("12) beta"), "beta");
        assert_eq!(strip_list_marker("- gamma"), "gamma");
        assert_eq!(strip_list_marker("2024 election odds"), "2024 election odds");
        assert_eq!(strip_list_marker("3.5 percent move"), "3.5 percent move");
    }

    #[tokio::test]
    /// Chat provider failure falls back to searching the bare topic.
    async fn query_generation_failure_downgraded() {
        let n = node(Arc::new(FailingChat), Arc::new(EchoSearch));
        let state = AnalysisState::new("bare topic", "job-r");
        let update = n.run(state.snapshot(), ctx()).await.unwrap();
        let research = update.research.unwrap();
        let docs = research.get(&Dimension::Settlement).unwrap();
        assert!(docs.contains("https://bare-topic"));
    }

    #[tokio::test]
    /// When every search call fails the dimension escalates.
    async fn total_search_failure_escalates() {
        let n = node(Arc::new(ScriptedChat("q1\nq2")), Arc::new(DownSearch));
        let state = AnalysisState::new("topic", "job-r");
        let err = n.run(state.snapshot(), ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::Provider(_)));
    }
}
