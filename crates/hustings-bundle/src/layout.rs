//! Run identifiers and bundle directory layout

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp format for run identifiers. Zero-padded fields keep the
/// lexicographic order of run names equal to their chronological order.
const RUN_ID_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%6f";

/// A run identifier: the UTC creation timestamp of the run.
///
/// Serves as both the unique ID and the sort key for a run's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(DateTime<Utc>);

impl RunId {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Parse a run directory or file stem back into an identifier.
    pub fn parse(s: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(s, RUN_ID_FORMAT)
            .ok()
            .map(|naive| Self(naive.and_utc()))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(RUN_ID_FORMAT))
    }
}

impl serde::Serialize for RunId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for RunId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("bad run id: {s}")))
    }
}

/// Path helpers for a bundle directory.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join("credentials.toml")
    }

    pub fn watermarks_path(&self) -> PathBuf {
        self.root.join("watermarks.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("bundle.lock")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Directory holding one run's raw response pages.
    pub fn run_raw_dir(&self, run: &RunId) -> PathBuf {
        self.raw_dir().join(run.to_string())
    }

    /// Per-run manifest path.
    pub fn manifest_path(&self, run: &RunId) -> PathBuf {
        self.root.join("runs").join(format!("{run}.json"))
    }

    /// Reduced-record file for a run.
    pub fn reduced_path(&self, run: &RunId) -> PathBuf {
        self.root.join("reduced").join(format!("{run}.json"))
    }

    /// Archive artifact for a run.
    pub fn archive_path(&self, run: &RunId) -> PathBuf {
        self.root.join("archived").join(format!("{run}.zip"))
    }

    /// Raw page filename for one term page. Sorting these names yields the
    /// deterministic reduction order: term slug, then page sequence.
    pub fn page_filename(term_slug: &str, seq: usize) -> String {
        format!("{term_slug}_{seq:04}.json")
    }

    /// All raw page files for a run, in sorted (deterministic) order.
    pub fn raw_page_paths(&self, run: &RunId) -> Result<Vec<PathBuf>> {
        let dir = self.run_raw_dir(run);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = dir.join("*.json");
        let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .context("invalid glob pattern")?
            .filter_map(|e| e.ok())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Pages already persisted for one term within a run (resume support).
    pub fn term_page_count(&self, run: &RunId, term_slug: &str) -> usize {
        let dir = self.run_raw_dir(run);
        let pattern = dir.join(format!("{term_slug}_*.json"));
        glob::glob(&pattern.to_string_lossy())
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    /// Every run known to the bundle, from any artifact tree, sorted oldest
    /// first.
    pub fn list_runs(&self) -> Result<Vec<RunId>> {
        let mut runs = BTreeSet::new();
        collect_run_ids(&self.raw_dir(), &mut runs)?;
        collect_run_ids(&self.root.join("runs"), &mut runs)?;
        collect_run_ids(&self.root.join("reduced"), &mut runs)?;
        collect_run_ids(&self.root.join("archived"), &mut runs)?;
        Ok(runs.into_iter().collect())
    }
}

fn collect_run_ids(dir: &Path, out: &mut BTreeSet<RunId>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // Artifact files carry an extension; run directories do not.
        let stem = name.split('.').next().unwrap_or(&name);
        if let Some(run) = RunId::parse(stem) {
            out.insert(run);
        }
    }
    Ok(())
}
