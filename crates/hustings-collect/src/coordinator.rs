//! Run coordinator — fans terms out to a worker pool
//!
//! Each term is an independent job: a failed term is recorded in the run
//! manifest and skipped next sweep, never aborting the rest of the run. Only
//! fatal errors (bad credentials, malformed queries) stop the whole run.
//! Resuming a run skips terms that already have pages on disk; their newest
//! markers are recovered from the persisted pages so watermarks still advance.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use hustings_bundle::{
    BundleConfig, BundleLayout, RunId, RunManifest, WatermarkStore, normalize_term, term_slug,
};
use hustings_core::{ProgressContext, WorkQueue, shutdown_flag};
use log::{info, warn};

use crate::fetcher::{self, DEFAULT_MAX_PAGES};
use crate::model::RawPage;
use crate::SearchClient;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub workers: usize,
    pub max_pages: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self { workers: 4, max_pages: DEFAULT_MAX_PAGES }
    }
}

/// One term's fetch assignment.
#[derive(Debug, Clone)]
struct TermJob {
    query: String,
    slug: String,
    /// Normalized form, the watermark key.
    normalized: String,
    since_id: Option<u64>,
}

#[derive(Debug, Default)]
pub struct CollectReport {
    pub terms_fetched: usize,
    pub terms_skipped: usize,
    pub terms_failed: usize,
    pub pages: usize,
    pub posts: usize,
    pub interrupted: bool,
}

/// Collect every active term of the configuration into `run`'s raw
/// directory, then write the run manifest and advance the watermarks.
pub fn collect_run(
    layout: &BundleLayout,
    config: &BundleConfig,
    watermarks: &mut WatermarkStore,
    client: &dyn SearchClient,
    run: &RunId,
    opts: &CollectOptions,
    progress: &ProgressContext,
) -> Result<CollectReport> {
    let run_dir = layout.run_raw_dir(run);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("cannot create {}", run_dir.display()))?;

    let mut jobs = Vec::new();
    for race in &config.races {
        for candidate in race.candidates.iter().filter(|c| c.active) {
            for term in &candidate.terms {
                let normalized = normalize_term(term);
                jobs.push(TermJob {
                    query: term.clone(),
                    slug: term_slug(term),
                    since_id: watermarks.get(&normalized).map(|w| w.last_id),
                    normalized,
                });
            }
        }
    }
    let total = jobs.len();

    // Terms with pages already on disk were fetched by an earlier attempt at
    // this run; skip them rather than re-spending API budget.
    let queue = WorkQueue::filtered(jobs, |job| layout.term_page_count(run, &job.slug) == 0);
    let skipped = total - queue.total();
    if skipped > 0 {
        info!("resuming run {run}: {skipped} of {total} terms already fetched");
    }

    let failed: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let fatal: Mutex<Option<crate::fetcher::FetchError>> = Mutex::new(None);
    let markers: Mutex<BTreeMap<String, u64>> = Mutex::new(BTreeMap::new());
    let pages = std::sync::atomic::AtomicUsize::new(0);
    let posts = std::sync::atomic::AtomicUsize::new(0);
    let is_tty = progress.is_tty();

    rayon::scope(|s| {
        for _ in 0..opts.workers {
            s.spawn(|_| {
                while let Some(job) = queue.claim() {
                    if shutdown_flag().load(Ordering::Relaxed) {
                        break;
                    }
                    if fatal.lock().expect("worker thread panicked").is_some() {
                        break;
                    }
                    let pb = progress.term_bar(&job.query);
                    match fetcher::fetch_term(
                        client,
                        &job.query,
                        job.since_id,
                        &run_dir,
                        opts.max_pages,
                        &pb,
                    ) {
                        Ok(outcome) => {
                            pb.finish_and_clear();
                            if !is_tty {
                                info!(
                                    "{}: {} pages, {} posts",
                                    job.query, outcome.pages, outcome.posts
                                );
                            }
                            pages.fetch_add(outcome.pages, Ordering::Relaxed);
                            posts.fetch_add(outcome.posts, Ordering::Relaxed);
                            if let Some(newest) = outcome.newest_id {
                                let mut m =
                                    markers.lock().expect("worker thread panicked");
                                let entry = m.entry(job.normalized.clone()).or_insert(newest);
                                *entry = (*entry).max(newest);
                            }
                        }
                        Err(e) if e.is_fatal() => {
                            pb.finish_and_clear();
                            *fatal.lock().expect("worker thread panicked") = Some(e);
                        }
                        Err(e) => {
                            pb.finish_and_clear();
                            warn!("{}: giving up: {e}", job.query);
                            failed
                                .lock()
                                .expect("worker thread panicked")
                                .push(job.normalized.clone());
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = fatal.into_inner().expect("worker thread panicked") {
        bail!("collection aborted: {e}");
    }

    let interrupted = shutdown_flag().load(Ordering::Relaxed);
    let mut failed_terms = failed.into_inner().expect("worker thread panicked");
    failed_terms.sort();
    let mut newest_markers = markers.into_inner().expect("worker thread panicked");

    // Terms skipped on resume still persisted pages last attempt; recover
    // their markers from disk so the watermark advances for them too.
    for (term, newest) in recover_markers(layout, run)? {
        let entry = newest_markers.entry(term).or_insert(newest);
        *entry = (*entry).max(newest);
    }

    let mut manifest = RunManifest::new(*run);
    manifest.failed_terms = failed_terms.clone();
    manifest.newest_markers = newest_markers.clone();
    if !interrupted {
        manifest.finished_at = Some(chrono::Utc::now());
        manifest.page_hashes = RunManifest::compute_page_hashes(layout, run)?;
    }
    manifest.write_to(&layout.manifest_path(run))?;

    // Watermarks only move once the manifest is durable; a crash in between
    // costs a re-fetch, never a gap.
    if !interrupted {
        let mut moved = 0;
        for (term, newest) in &newest_markers {
            if watermarks.advance(term, *newest, run.timestamp()) {
                moved += 1;
            }
        }
        if moved > 0 {
            watermarks.save()?;
        }
        info!("advanced {moved} watermarks");
    }

    Ok(CollectReport {
        terms_fetched: queue.total() - failed_terms.len(),
        terms_skipped: skipped,
        terms_failed: failed_terms.len(),
        pages: pages.into_inner(),
        posts: posts.into_inner(),
        interrupted,
    })
}

/// Re-read persisted pages and take the max post id per normalized term.
fn recover_markers(layout: &BundleLayout, run: &RunId) -> Result<BTreeMap<String, u64>> {
    let mut markers = BTreeMap::new();
    for path in layout.raw_page_paths(run)? {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let page: RawPage = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping unreadable page {}: {e}", path.display());
                continue;
            }
        };
        let Some(newest) = page.posts.iter().map(|p| p.id).max() else {
            continue;
        };
        let term = normalize_term(&page.query);
        let entry = markers.entry(term).or_insert(newest);
        *entry = (*entry).max(newest);
    }
    Ok(markers)
}
