//! `hustings reduce` - sweep every collected run through reduction

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use hustings_pipeline::{Bundle, sweep_reduce};

#[derive(Args, Debug)]
pub struct ReduceArgs {
    /// Bundle directory
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
}

pub fn run(args: ReduceArgs) -> Result<()> {
    let (layout, config) = Bundle::open_readonly(&args.bundle)?;
    let index = hustings_bundle::TermIndex::build(&config)?;
    let advanced = sweep_reduce(&layout, &index)?;
    if advanced.is_empty() {
        eprintln!("nothing to reduce");
    } else {
        for run in &advanced {
            eprintln!("reduced {run}");
        }
    }
    Ok(())
}
