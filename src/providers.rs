//! Trait seams for the external collaborators node bodies call out to.
//!
//! The engine defines only the envelope: a chat completion call and a search
//! call, both async and fallible. Concrete clients (hosted LLM APIs, web
//! search services) live outside this crate; tests use deterministic fakes.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::document::Document;

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Produce one completion for the given system and user prompts.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

/// A document search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query and return up to `max_results` scored documents.
    async fn search(&self, query: &str, max_results: usize)
    -> Result<Vec<Document>, ProviderError>;
}

/// Failures surfaced by external providers.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("provider {provider} unavailable: {message}")]
    #[diagnostic(
        code(prospector::provider::unavailable),
        help("Check connectivity and credentials for the external service.")
    )]
    Unavailable {
        provider: &'static str,
        message: String,
    },

    #[error("provider {provider} returned a malformed response: {message}")]
    #[diagnostic(code(prospector::provider::malformed))]
    Malformed {
        provider: &'static str,
        message: String,
    },

    #[error("provider {provider} returned empty content")]
    #[diagnostic(code(prospector::provider::empty))]
    EmptyContent { provider: &'static str },
}
