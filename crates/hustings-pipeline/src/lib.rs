//! hustings-pipeline: collect → reduce → archive as one resumable operation
//!
//! The orchestrator owns run selection and stage sequencing; the individual
//! stages live in their own crates and are each idempotent. A bundle lock
//! file keeps two pipeline instances off the same bundle; within a run the
//! stages are strictly sequential, while distinct runs have no ordering.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use hustings_bundle::{
    BundleConfig, BundleLayout, Credentials, RunId, RunManifest, RunStage, TermIndex,
    WatermarkStore,
};
use hustings_collect::{CollectOptions, SearchClient, archive_run, collect_run};
use hustings_core::ProgressContext;
use hustings_reduce::reduce_run;
use log::{info, warn};

/// Holds `bundle.lock` for the life of one pipeline invocation.
///
/// The lock is advisory: a leftover file from a crashed process must be
/// removed by hand, which beats two live processes interleaving fetches.
#[derive(Debug)]
pub struct BundleLock {
    path: PathBuf,
}

impl BundleLock {
    pub fn acquire(layout: &BundleLayout) -> Result<Self> {
        let path = layout.lock_path();
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!(
                    "bundle is locked by another pipeline ({} exists); \
                     remove it if that process is dead",
                    path.display()
                )
            }
            Err(e) => {
                Err(e).with_context(|| format!("cannot create lock {}", path.display()))
            }
        }
    }
}

impl Drop for BundleLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove {}: {e}", self.path.display());
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub run: RunId,
    pub stage: RunStage,
    pub resumed: bool,
    pub failed_terms: Vec<String>,
    pub records: usize,
}

/// Everything the pipeline needs from a bundle on disk.
#[derive(Debug)]
pub struct Bundle {
    pub layout: BundleLayout,
    pub config: BundleConfig,
    pub index: TermIndex,
    pub credentials: Credentials,
    pub watermarks: WatermarkStore,
}

impl Bundle {
    /// Load and validate a bundle directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = BundleLayout::new(root);
        // from_file validates; only the index needs building here.
        let config = BundleConfig::from_file(&layout.config_path())?;
        let index = TermIndex::build(&config)?;
        let credentials = Credentials::from_file(&layout.credentials_path())?;
        let watermarks = WatermarkStore::load(&layout.watermarks_path());
        Ok(Self { layout, config, index, credentials, watermarks })
    }

    /// Open without credentials, for read-only operations like status.
    pub fn open_readonly(root: impl Into<PathBuf>) -> Result<(BundleLayout, BundleConfig)> {
        let layout = BundleLayout::new(root);
        let config = BundleConfig::from_file(&layout.config_path())?;
        Ok((layout, config))
    }
}

/// Drive one run through collect → reduce → archive.
///
/// Resumes the newest run still short of `Archived`, or starts a fresh run
/// when there is nothing to resume. Invoking this on a bundle whose runs are
/// all archived performs exactly one new collection; invoking the stage
/// helpers on an archived run performs no work at all.
pub fn run_pipeline(
    bundle: &mut Bundle,
    client: &dyn SearchClient,
    opts: &CollectOptions,
    progress: &ProgressContext,
) -> Result<PipelineReport> {
    let _lock = BundleLock::acquire(&bundle.layout)?;

    let (run, resumed) = match newest_unfinished(&bundle.layout)? {
        Some(run) => {
            info!("resuming run {run} at stage {}", RunStage::detect(&bundle.layout, &run));
            (run, true)
        }
        None => {
            let run = RunId::now();
            info!("starting run {run}");
            (run, false)
        }
    };

    advance_run(bundle, client, opts, progress, &run, resumed)
}

/// Take one run through every stage it is still missing.
fn advance_run(
    bundle: &mut Bundle,
    client: &dyn SearchClient,
    opts: &CollectOptions,
    progress: &ProgressContext,
    run: &RunId,
    resumed: bool,
) -> Result<PipelineReport> {
    let mut failed_terms = Vec::new();

    if RunStage::detect(&bundle.layout, run) < RunStage::Collected {
        let report = collect_run(
            &bundle.layout,
            &bundle.config,
            &mut bundle.watermarks,
            client,
            run,
            opts,
            progress,
        )?;
        if report.interrupted {
            info!("run {run}: interrupted during collection");
            return Ok(PipelineReport {
                run: *run,
                stage: RunStage::detect(&bundle.layout, run),
                resumed,
                failed_terms,
                records: 0,
            });
        }
    }
    if let Ok(manifest) = RunManifest::read_from(&bundle.layout.manifest_path(run)) {
        failed_terms = manifest.failed_terms;
    }

    let mut records = 0;
    if RunStage::detect(&bundle.layout, run) == RunStage::Collected {
        records = reduce_run(&bundle.layout, &bundle.index, run)?;
    }

    if RunStage::detect(&bundle.layout, run) == RunStage::Reduced {
        archive_run(&bundle.layout, run)?;
    }

    Ok(PipelineReport {
        run: *run,
        stage: RunStage::detect(&bundle.layout, run),
        resumed,
        failed_terms,
        records,
    })
}

/// Newest run that has not reached `Archived`, if any.
fn newest_unfinished(layout: &BundleLayout) -> Result<Option<RunId>> {
    Ok(layout
        .list_runs()?
        .into_iter()
        .rev()
        .find(|run| RunStage::detect(layout, run) < RunStage::Archived))
}

/// Reduce every collected-but-unreduced run. Returns the runs advanced.
///
/// Takes the bundle lock: two sweeps writing the same temp artifacts would
/// trip each other's verification.
pub fn sweep_reduce(layout: &BundleLayout, index: &TermIndex) -> Result<Vec<RunId>> {
    let _lock = BundleLock::acquire(layout)?;
    let mut advanced = Vec::new();
    for run in layout.list_runs()? {
        if RunStage::detect(layout, &run) == RunStage::Collected {
            reduce_run(layout, index, &run)?;
            advanced.push(run);
        }
    }
    Ok(advanced)
}

/// Archive every reduced-but-unarchived run. Returns the runs advanced.
/// Takes the bundle lock, like [`sweep_reduce`].
pub fn sweep_archive(layout: &BundleLayout) -> Result<Vec<RunId>> {
    let _lock = BundleLock::acquire(layout)?;
    let mut advanced = Vec::new();
    for run in layout.list_runs()? {
        if RunStage::detect(layout, &run) == RunStage::Reduced {
            archive_run(layout, &run)?;
            advanced.push(run);
        }
    }
    Ok(advanced)
}
