//! HTTP search client
//!
//! Uses async reqwest internally over a shared runtime, but presents a sync
//! interface for compatibility with rayon workers.

use std::sync::LazyLock;
use std::time::Duration;

use hustings_bundle::Credentials;
use serde::Deserialize;

use crate::client::{SearchClient, SearchError, SearchPage};
use crate::model::RawPost;

const SEARCH_URL: &str = "https://api.twitter.com/1.1/search/tweets.json";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts requested per page. The API caps result pages at 100.
const PAGE_SIZE: u32 = 100;

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Search API client authenticated with a bearer token.
pub struct HttpSearchClient {
    base_url: String,
    bearer_token: String,
}

/// Response envelope for the search endpoint.
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<RawPost>,
}

impl HttpSearchClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            base_url: SEARCH_URL.to_string(),
            bearer_token: credentials.bearer_token(),
        }
    }

    /// Point the client at a different endpoint. Used by tests against a
    /// local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn classify_status(status: reqwest::StatusCode, reset: Option<Duration>) -> SearchError {
        match status.as_u16() {
            401 | 403 => SearchError::Auth(format!("request rejected with {status}")),
            429 => SearchError::RateLimited { reset },
            400 | 404 | 422 => SearchError::Malformed(format!("request rejected with {status}")),
            _ => SearchError::Network(format!("unexpected status {status}")),
        }
    }
}

/// Seconds until the epoch timestamp in `x-rate-limit-reset`, if present
/// and still in the future.
fn reset_delay(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let reset: u64 = headers.get("x-rate-limit-reset")?.to_str().ok()?.parse().ok()?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

impl SearchClient for HttpSearchClient {
    fn search(
        &self,
        term: &str,
        since_id: Option<u64>,
        max_id: Option<u64>,
    ) -> Result<SearchPage, SearchError> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", term.to_string()),
            ("result_type", "recent".to_string()),
            ("count", PAGE_SIZE.to_string()),
            ("include_entities", "1".to_string()),
        ];
        if let Some(id) = since_id {
            params.push(("since_id", id.to_string()));
        }
        if let Some(id) = max_id {
            params.push(("max_id", id.to_string()));
        }

        SHARED_RUNTIME.handle().block_on(async {
            let response = SHARED_CLIENT
                .get(&self.base_url)
                .bearer_auth(&self.bearer_token)
                .query(&params)
                .send()
                .await
                .map_err(|e| SearchError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let reset = reset_delay(response.headers());
                return Err(Self::classify_status(status, reset));
            }

            let body: SearchResponse = response
                .json()
                .await
                .map_err(|e| SearchError::Malformed(format!("bad response body: {e}")))?;
            Ok(SearchPage { posts: body.statuses })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_status_maps_to_rate_limited() {
        let err = HttpSearchClient::classify_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(30)),
        );
        assert!(matches!(
            err,
            SearchError::RateLimited { reset: Some(d) } if d == Duration::from_secs(30)
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn auth_statuses_are_fatal() {
        for code in [401u16, 403] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            let err = HttpSearchClient::classify_status(status, None);
            assert!(err.is_fatal(), "{code} should be fatal");
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        let err =
            HttpSearchClient::classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, None);
        assert!(err.is_retryable());
    }

    #[test]
    fn reset_delay_ignores_past_timestamps() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-rate-limit-reset", "100".parse().unwrap());
        assert_eq!(reset_delay(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn reset_delay_absent_without_header() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(reset_delay(&headers), None);
    }
}
