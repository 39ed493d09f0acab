//! `hustings collect` - collection only, leaving reduce/archive for later

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use hustings_bundle::{RunId, RunStage};
use hustings_collect::{CollectOptions, HttpSearchClient, collect_run};
use hustings_core::ProgressContext;
use hustings_pipeline::{Bundle, BundleLock};

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Bundle directory
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,

    /// Parallel term fetches
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Page ceiling per term per run
    #[arg(long, default_value_t = hustings_collect::DEFAULT_MAX_PAGES)]
    pub max_pages: usize,
}

pub fn run(args: CollectArgs, progress: &ProgressContext) -> Result<()> {
    let mut bundle = Bundle::open(&args.bundle)?;
    let _lock = BundleLock::acquire(&bundle.layout)?;
    let client = HttpSearchClient::new(&bundle.credentials);
    let opts = CollectOptions { workers: args.workers, max_pages: args.max_pages };

    // Resume a run that died mid-collection rather than starting another.
    let run = bundle
        .layout
        .list_runs()?
        .into_iter()
        .rev()
        .find(|r| RunStage::detect(&bundle.layout, r) < RunStage::Collected)
        .unwrap_or_else(RunId::now);

    let report = collect_run(
        &bundle.layout,
        &bundle.config,
        &mut bundle.watermarks,
        &client,
        &run,
        &opts,
        progress,
    )?;

    progress.println(format!(
        "run {run}: {} terms fetched ({} skipped, {} failed), {} pages, {} posts",
        report.terms_fetched,
        report.terms_skipped,
        report.terms_failed,
        report.pages,
        report.posts
    ));
    if report.interrupted {
        progress.println(format!("run {run}: interrupted, rerun to finish"));
    }
    Ok(())
}
