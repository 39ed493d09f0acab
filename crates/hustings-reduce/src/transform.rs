//! Field reduction and deduplication
//!
//! Two pure passes composed in-process: `reduce` flattens raw pages into
//! tagged records, `dedupe` collapses records that the same candidate's
//! overlapping terms surfaced more than once. Representative selection is
//! first-encountered in raw page order (pages sorted by filename, posts in
//! page order), which makes identical raw input reduce byte-identically.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use hustings_bundle::{BundleLayout, RunId, RunStage, TermIndex, normalize_term};
use hustings_collect::RawPage;
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::record::ReducedRecord;

/// Flatten raw pages into one record per raw post.
///
/// Each record carries its originating query (normalized) and the candidate
/// that owns the term. Posts from terms absent from the configuration are
/// dropped; stale pages from a since-edited config are not an error.
pub fn reduce(pages: &[RawPage], index: &TermIndex) -> Vec<ReducedRecord> {
    let mut records = Vec::new();
    let mut dropped = 0usize;
    for page in pages {
        let Some(candidate) = index.candidate_for(&page.query) else {
            dropped += page.posts.len();
            continue;
        };
        let query = normalize_term(&page.query);
        for post in &page.posts {
            records.push(ReducedRecord::from_raw(post, query.clone(), candidate.to_string()));
        }
    }
    if dropped > 0 {
        debug!("dropped {dropped} posts from unconfigured terms");
    }
    records
}

/// Collapse duplicate (candidate, post id) records into one.
///
/// The first-encountered record keeps its fields; query sets are unioned and
/// sorted. Input order is preserved for the survivors.
pub fn dedupe(records: Vec<ReducedRecord>) -> Vec<ReducedRecord> {
    let mut out: Vec<ReducedRecord> = Vec::with_capacity(records.len());
    let mut seen: FxHashMap<(String, u64), usize> = FxHashMap::default();
    for record in records {
        match seen.get(&(record.candidate.clone(), record.id)) {
            Some(&idx) => {
                let existing = &mut out[idx];
                let mut queries: BTreeSet<String> =
                    existing.queries.iter().cloned().collect();
                queries.extend(record.queries);
                existing.queries = queries.into_iter().collect();
            }
            None => {
                seen.insert((record.candidate.clone(), record.id), out.len());
                let mut record = record;
                record.queries.sort();
                record.queries.dedup();
                out.push(record);
            }
        }
    }
    out
}

/// Exact multiset inverse of deduplication: one record per originating
/// query. Re-deduplicating the result returns the input.
pub fn expand(records: Vec<ReducedRecord>) -> Vec<ReducedRecord> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        for query in &record.queries {
            let mut single = record.clone();
            single.queries = vec![query.clone()];
            out.push(single);
        }
    }
    out
}

/// Reduce one run's raw pages into its reduced-record file.
///
/// Requires the run to be collected; a run already reduced or archived is a
/// no-op. The file is written atomically, so a crash mid-reduce leaves the
/// run at `collected` and the next sweep redoes it.
pub fn reduce_run(layout: &BundleLayout, index: &TermIndex, run: &RunId) -> Result<usize> {
    let stage = RunStage::detect(layout, run);
    if stage >= RunStage::Reduced {
        info!("run {run} already reduced");
        let existing = std::fs::read_to_string(layout.reduced_path(run))?;
        let records: Vec<serde_json::Value> =
            serde_json::from_str(&existing).context("existing reduced file is unreadable")?;
        return Ok(records.len());
    }
    if stage < RunStage::Collected {
        bail!("run {run} is {stage}, collect it before reducing");
    }

    let mut pages = Vec::new();
    for path in layout.raw_page_paths(run)? {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let page: RawPage = serde_json::from_str(&text)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        pages.push(page);
    }

    let records = dedupe(reduce(&pages, index));
    info!("run {run}: reduced {} pages to {} records", pages.len(), records.len());

    let path = layout.reduced_path(run);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&records).context("failed to serialize records")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to rename {} into place", tmp.display()))?;
    Ok(records.len())
}
