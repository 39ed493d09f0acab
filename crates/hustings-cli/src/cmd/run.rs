//! `hustings run` - the full pipeline over one bundle

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use hustings_collect::{CollectOptions, HttpSearchClient};
use hustings_core::ProgressContext;
use hustings_pipeline::{Bundle, run_pipeline};

#[derive(Args, Debug)]
pub struct RunArgs {
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

pub fn run(args: RunArgs, progress: &ProgressContext) -> Result<()> {
    let mut bundle = Bundle::open(&args.bundle)?;
    let client = HttpSearchClient::new(&bundle.credentials);
    let opts = CollectOptions { workers: args.workers, max_pages: args.max_pages };

    let report = run_pipeline(&mut bundle, &client, &opts, progress)?;

    let verb = if report.resumed { "resumed" } else { "ran" };
    progress.println(format!(
        "{verb} {} to stage {}, {} records",
        report.run, report.stage, report.records
    ));
    if !report.failed_terms.is_empty() {
        progress.println(format!(
            "{} terms failed and will retry next run: {}",
            report.failed_terms.len(),
            report.failed_terms.join(", ")
        ));
    }
    Ok(())
}
