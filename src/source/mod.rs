//! Source adapters and the registry that resolves them.
//!
//! Each upstream gets one adapter implementing [`SourceAdapter`]. Adapters
//! own all upstream-specific concerns (endpoints, auth, response shapes,
//! quirks) and emit canonical [`Post`]s; nothing upstream-specific leaks
//! past this module.

mod hackernews;
mod probe;
mod reddit;
mod registry;
mod twitter;

pub use hackernews::HackerNewsAdapter;
pub use probe::QuotaProbe;
pub use reddit::RedditAdapter;
pub use registry::SourceRegistry;
pub use twitter::TwitterAdapter;

use crate::model::{Post, Source, SourceConfig};
use async_trait::async_trait;
use thiserror::Error;

/// Per-request timeout applied by every adapter.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while fetching from an upstream.
///
/// These cover the full lifecycle of a fetch: network issues, HTTP
/// errors, auth failures, and malformed response bodies.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body could not be decoded into the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// Credentials are missing or were rejected by the upstream
    #[error("Authentication failed: {0}")]
    Auth(String),
}

/// Send a request with the standard timeout and map non-2xx to an error.
///
/// 401/403 map to `Auth` so credential problems read as such in logs
/// instead of as generic HTTP failures.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, FetchError> {
    let response = tokio::time::timeout(
        std::time::Duration::from_secs(FETCH_TIMEOUT_SECS),
        request.send(),
    )
    .await
    .map_err(|_| FetchError::Timeout)?
    .map_err(FetchError::Network)?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::Auth(format!("upstream returned {}", status)));
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    Ok(response)
}

/// A source-specific fetcher producing canonical posts.
///
/// Implementations must be self-contained: a failing adapter returns an
/// error and never panics, so the orchestrator can isolate the failure to
/// that one source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source this adapter serves.
    fn source(&self) -> Source;

    /// Fetch a full page of recent posts, newest first where the upstream
    /// offers an order. Every returned post carries `self.source()` and a
    /// namespaced id.
    async fn fetch_posts(&self, config: &SourceConfig) -> Result<Vec<Post>, FetchError>;

    /// Fetch only the single most recent post, for the quota probe.
    ///
    /// The default delegates to a full fetch and truncates. Adapters for
    /// quota-limited upstreams override this with a genuinely cheaper
    /// request.
    async fn fetch_latest(&self, config: &SourceConfig) -> Result<Option<Post>, FetchError> {
        let mut posts = self.fetch_posts(config).await?;
        if posts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(posts.swap_remove(0)))
        }
    }
}
