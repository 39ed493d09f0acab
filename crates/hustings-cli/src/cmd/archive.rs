//! `hustings archive` - sweep every reduced run into its archive

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use hustings_pipeline::{Bundle, sweep_archive};

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Bundle directory
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
}

pub fn run(args: ArchiveArgs) -> Result<()> {
    let (layout, _config) = Bundle::open_readonly(&args.bundle)?;
    let advanced = sweep_archive(&layout)?;
    if advanced.is_empty() {
        eprintln!("nothing to archive");
    } else {
        for run in &advanced {
            eprintln!("archived {run}");
        }
    }
    Ok(())
}
