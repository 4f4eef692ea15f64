// Upstream fetch abstraction - one HTTP call per poll tick

use async_trait::async_trait;
use serde_json::Value;

/// Outcome of a single upstream call.
///
/// Fetchers never return `Err`: network errors, non-2xx statuses and
/// malformed bodies are all reported as `Failed` with a readable message.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Success(Value),
    Failed(String),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }
}

/// Source of raw provider payloads for one feed.
/// The native implementation is `native::HttpFetcher`; tests script their own.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self) -> FetchResult;
}
