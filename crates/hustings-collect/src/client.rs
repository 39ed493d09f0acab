//! Search capability: the external API seam the fetcher calls
//!
//! The fetcher only depends on this trait; the production implementation is
//! [`HttpSearchClient`](crate::http::HttpSearchClient), and tests substitute
//! canned-page clients.

use std::time::Duration;

use crate::model::RawPost;

/// One page of search results, newest-first in the API's native order.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub posts: Vec<RawPost>,
}

/// Error from one search call, classified per the retry policy:
/// rate-limit and network errors are retryable for the affected term only,
/// auth and malformed-request errors are fatal to the whole run.
#[derive(Debug)]
pub enum SearchError {
    /// API rate limit hit; `reset` is the server-advertised wait, if any.
    RateLimited { reset: Option<Duration> },
    /// Transient transport failure.
    Network(String),
    /// Credentials rejected. Never retried: the whole run is misconfigured.
    Auth(String),
    /// The request itself was invalid (bad query, unparseable response).
    Malformed(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { reset: Some(d) } => {
                write!(f, "rate limited (reset in {}s)", d.as_secs())
            }
            Self::RateLimited { reset: None } => write!(f, "rate limited"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed request: {msg}"),
        }
    }
}

impl std::error::Error for SearchError {}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }

    /// Fatal errors abort the whole run, not just one term.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Malformed(_))
    }
}

/// The search capability.
///
/// `since_id` is the exclusive lower bound (the term's watermark);
/// `max_id` is the inclusive upper bound used for pagination.
pub trait SearchClient: Sync {
    fn search(
        &self,
        term: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
    ) -> Result<SearchPage, SearchError>;
}
