//! hustings - incremental collection and archival of election-related posts
//!
//! A bundle directory holds the configuration (races, candidates, search
//! terms), credentials, watermarks, and every run's artifacts. Each
//! subcommand operates on one bundle.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hustings_core::shutdown_flag;

mod cmd;

#[derive(Parser)]
#[command(name = "hustings")]
#[command(about = "Incremental collection and archival of election-related posts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: collect, reduce, archive
    Run(cmd::run::RunArgs),
    /// Collect raw pages for a new or resumed run
    Collect(cmd::collect::CollectArgs),
    /// Reduce every collected run into its record file
    Reduce(cmd::reduce::ReduceArgs),
    /// Archive every reduced run and remove its raw pages
    Archive(cmd::archive::ArchiveArgs),
    /// Show every run and its stage
    Status(cmd::status::StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_signal_handler();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(hustings_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — progress bars show activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let quiet = if progress.is_tty() { !cli.debug } else { false };
    hustings_core::init_logging(quiet, cli.debug);

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &progress),
        Command::Collect(args) => cmd::collect::run(args, &progress),
        Command::Reduce(args) => cmd::reduce::run(args),
        Command::Archive(args) => cmd::archive::run(args),
        Command::Status(args) => cmd::status::run(args),
    }
}

fn setup_signal_handler() {
    // First signal: set graceful shutdown flag
    // Second signal: force exit (default SIGINT behavior restored)
    // SAFETY: AtomicBool::store and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGTERM handler");
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGINT handler");
    }
}
