//! Document analysis via an external generative provider
//!
//! The client picks a request strategy from the payload size, walks a
//! prioritized model list with bounded per-model retries, and classifies
//! every failure so the retry policy never has to inspect provider-specific
//! error shapes.

mod client;
mod prompt;
mod strategy;

pub use client::GeminiClient;
pub use strategy::RequestStrategy;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::types::analysis::AnalysisResult;

/// Failure classification for one analysis attempt
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Provider rate limit or quota exhaustion; retry with backoff
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    /// Transient provider failure (5xx, timeout, connection loss); retryable
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider answered but no usable result could be produced from it;
    /// a different model in the fallback list may still succeed
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Source file unresolvable after the fallback lookup; retrying cannot fix it
    #[error("source file unavailable: {0}")]
    MissingInput(String),

    /// Media type or size outside every handled strategy; terminal
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// Every strategy and model exhausted for this attempt
    #[error("all analysis models exhausted: {0}")]
    ProviderUnavailable(String),
}

impl AnalysisError {
    /// Whether a later execution attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_)
            | Self::Transient(_)
            | Self::MalformedResponse(_)
            | Self::ProviderUnavailable(_) => true,
            Self::MissingInput(_) | Self::UnsupportedInput(_) => false,
        }
    }
}

/// Seam between the worker pool and the external provider
///
/// Production uses [`GeminiClient`]; tests substitute scripted implementations.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze a document and extract structured information
    ///
    /// `source_path` is the on-disk location of the bytes, used by the
    /// out-of-band upload strategy for naming.
    async fn analyze(
        &self,
        data: &[u8],
        media_type: &str,
        source_path: Option<&Path>,
    ) -> std::result::Result<AnalysisResult, AnalysisError>;
}
