//! Run configuration knobs with env-backed overrides.

use tracing::warn;

/// Tunable limits for one pipeline run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Search queries generated per analysis dimension.
    pub queries_per_dimension: usize,
    /// Documents requested per search call.
    pub search_results_per_query: usize,
    /// Documents the curator keeps per dimension.
    pub curated_per_dimension: usize,
    /// Simultaneous outstanding briefing LLM calls.
    pub briefing_concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            queries_per_dimension: 2,
            search_results_per_query: 5,
            curated_per_dimension: 5,
            briefing_concurrency: 4,
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `PROSPECTOR_*` environment variables, loaded
    /// through dotenv when a `.env` file is present. Unparseable values are
    /// warned about and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        override_usize("PROSPECTOR_QUERIES_PER_DIMENSION", &mut config.queries_per_dimension);
        override_usize(
            "PROSPECTOR_SEARCH_RESULTS_PER_QUERY",
            &mut config.search_results_per_query,
        );
        override_usize(
            "PROSPECTOR_CURATED_PER_DIMENSION",
            &mut config.curated_per_dimension,
        );
        override_usize(
            "PROSPECTOR_BRIEFING_CONCURRENCY",
            &mut config.briefing_concurrency,
        );
        config
    }
}

fn override_usize(var: &str, slot: &mut usize) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<usize>() {
            Ok(value) if value > 0 => *slot = value,
            _ => warn!(var, raw = %raw, "ignoring invalid configuration override"),
        }
    }
}
