//! Per-term paginated fetch
//!
//! Walks one term's results newest-to-oldest, persisting each non-empty page
//! to disk before requesting the next. Pagination stops when a page is empty,
//! when it reaches the watermark bound, or at the page ceiling. Pages are
//! written with a tmp-file rename so a crash never leaves a partial page.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use hustings_bundle::BundleLayout;
use hustings_core::backoff_duration;
use indicatif::ProgressBar;
use log::{debug, warn};

use crate::client::{SearchClient, SearchError};
use crate::model::RawPage;

/// Pages fetched per term per run before giving up on reaching the
/// watermark. Bounds a run's cost when a term has been idle for a while.
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Transient failures are retried this many times before the term is
/// recorded as failed.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug)]
pub enum FetchError {
    Search(SearchError),
    Io(io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search(e) => write!(f, "search failed: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl FetchError {
    /// Fatal errors should stop the whole run, not just this term.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Search(e) if e.is_fatal())
    }
}

/// What a completed fetch of one term produced.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub pages: usize,
    pub posts: usize,
    /// Highest post id seen across all pages, the candidate new watermark.
    pub newest_id: Option<u64>,
}

/// Fetch one term's pages into `run_dir`, newest first.
///
/// `since_id` is the exclusive lower bound from the watermark store. Posts at
/// or below it are trimmed before the page is persisted; a page that touches
/// the bound ends pagination.
pub fn fetch_term(
    client: &dyn SearchClient,
    query: &str,
    since_id: Option<u64>,
    run_dir: &Path,
    max_pages: usize,
    pb: &ProgressBar,
) -> Result<FetchOutcome, FetchError> {
    let slug = hustings_bundle::term_slug(query);
    let mut outcome = FetchOutcome::default();
    let mut max_id: Option<u64> = None;

    for seq in 0..max_pages {
        pb.set_message(format!("page {}", seq + 1));
        let page = search_with_retry(client, query, since_id, max_id)?;
        if page.posts.is_empty() {
            debug!("{query}: page {seq} empty, done");
            break;
        }

        let oldest = page.posts.iter().map(|p| p.id).min().unwrap_or(0);
        let newest = page.posts.iter().map(|p| p.id).max().unwrap_or(0);
        outcome.newest_id = Some(outcome.newest_id.map_or(newest, |n| n.max(newest)));

        // Results at or below the watermark were collected by an earlier run.
        let bound = since_id.unwrap_or(0);
        let reached_bound = since_id.is_some() && oldest <= bound;
        let mut posts = page.posts;
        if reached_bound {
            posts.retain(|p| p.id > bound);
        }

        if !posts.is_empty() {
            outcome.pages += 1;
            outcome.posts += posts.len();
            let raw = RawPage {
                query: query.to_string(),
                fetched_at: Utc::now(),
                since_id,
                max_id,
                posts,
            };
            write_page(run_dir, &BundleLayout::page_filename(&slug, seq), &raw)?;
        }

        if reached_bound {
            debug!("{query}: reached watermark {bound} at page {seq}");
            break;
        }
        // Next page is everything strictly older than this one.
        if oldest == 0 {
            break;
        }
        max_id = Some(oldest - 1);
    }

    Ok(outcome)
}

fn search_with_retry(
    client: &dyn SearchClient,
    query: &str,
    since_id: Option<u64>,
    max_id: Option<u64>,
) -> Result<crate::client::SearchPage, FetchError> {
    let mut attempt = 0u32;
    loop {
        match client.search(query, since_id, max_id) {
            Ok(page) => return Ok(page),
            Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = match &e {
                    SearchError::RateLimited { reset: Some(d) } => *d,
                    _ => backoff_duration(attempt),
                };
                warn!("{query}: {e}, retrying in {}s", delay.as_secs());
                sleep_capped(delay);
                attempt += 1;
            }
            Err(e) => return Err(FetchError::Search(e)),
        }
    }
}

/// Cap server-supplied reset delays; a clock-skewed header should not park a
/// worker for hours.
fn sleep_capped(delay: Duration) {
    const MAX_SLEEP: Duration = Duration::from_secs(15 * 60);
    thread::sleep(delay.min(MAX_SLEEP));
}

fn write_page(run_dir: &Path, filename: &str, page: &RawPage) -> io::Result<()> {
    let final_path = run_dir.join(filename);
    let tmp_path = run_dir.join(format!("{filename}.tmp"));
    let mut file = fs::File::create(&tmp_path)?;
    serde_json::to_writer(&mut file, page).map_err(io::Error::other)?;
    file.flush()?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::client::{SearchError, SearchPage};
    use crate::model::RawPost;

    /// Serves scripted responses, one per call.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<SearchPage, SearchError>>>,
    }

    impl ScriptedClient {
        fn new(mut responses: Vec<Result<SearchPage, SearchError>>) -> Self {
            responses.reverse();
            Self { responses: Mutex::new(responses) }
        }
    }

    impl SearchClient for ScriptedClient {
        fn search(
            &self,
            _term: &str,
            _since_id: Option<u64>,
            _max_id: Option<u64>,
        ) -> Result<SearchPage, SearchError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(SearchPage { posts: vec![] }))
        }
    }

    fn page_of(ids: &[u64]) -> Result<SearchPage, SearchError> {
        Ok(SearchPage { posts: ids.iter().map(|&id| RawPost::stub(id)).collect() })
    }

    fn bar() -> ProgressBar {
        ProgressBar::hidden()
    }

    #[test]
    fn stops_and_trims_at_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(vec![page_of(&[105, 104, 103, 99])]);
        let out = fetch_term(&client, "rahm", Some(100), dir.path(), 5, &bar()).unwrap();
        assert_eq!(out.pages, 1);
        assert_eq!(out.posts, 3);
        assert_eq!(out.newest_id, Some(105));

        let persisted: RawPage = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("rahm_0000.json")).unwrap(),
        )
        .unwrap();
        let ids: Vec<u64> = persisted.posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![105, 104, 103]);
    }

    #[test]
    fn paginates_until_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(vec![
            page_of(&[30, 29]),
            page_of(&[28, 27]),
            Ok(SearchPage { posts: vec![] }),
        ]);
        let out = fetch_term(&client, "rahm", None, dir.path(), 5, &bar()).unwrap();
        assert_eq!(out.pages, 2);
        assert_eq!(out.posts, 4);
        assert_eq!(out.newest_id, Some(30));
        assert!(dir.path().join("rahm_0000.json").exists());
        assert!(dir.path().join("rahm_0001.json").exists());
        assert!(!dir.path().join("rahm_0002.json").exists());
    }

    #[test]
    fn honors_page_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(vec![
            page_of(&[30]),
            page_of(&[20]),
            page_of(&[10]),
            page_of(&[5]),
        ]);
        let out = fetch_term(&client, "rahm", None, dir.path(), 2, &bar()).unwrap();
        assert_eq!(out.pages, 2);
        assert_eq!(out.newest_id, Some(30));
    }

    #[test]
    fn retries_rate_limit_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(vec![
            Err(SearchError::RateLimited { reset: Some(Duration::ZERO) }),
            page_of(&[7]),
            Ok(SearchPage { posts: vec![] }),
        ]);
        let out = fetch_term(&client, "rahm", None, dir.path(), 5, &bar()).unwrap();
        assert_eq!(out.pages, 1);
        assert_eq!(out.posts, 1);
    }

    #[test]
    fn auth_failure_is_immediate_and_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(vec![Err(SearchError::Auth("bad token".into()))]);
        let err = fetch_term(&client, "rahm", None, dir.path(), 5, &bar()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn exhausted_retries_fail_the_term() {
        let dir = tempfile::tempdir().unwrap();
        let rl = || Err(SearchError::RateLimited { reset: Some(Duration::ZERO) });
        let client = ScriptedClient::new(vec![rl(), rl(), rl()]);
        let err = fetch_term(&client, "rahm", None, dir.path(), 5, &bar()).unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, FetchError::Search(SearchError::RateLimited { .. })));
    }

    #[test]
    fn slug_is_used_for_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let client =
            ScriptedClient::new(vec![page_of(&[3]), Ok(SearchPage { posts: vec![] })]);
        fetch_term(&client, "Rahm Emanuel", None, dir.path(), 5, &bar()).unwrap();
        let slug = hustings_bundle::term_slug("Rahm Emanuel");
        assert!(dir.path().join(format!("{slug}_0000.json")).exists());
    }
}
