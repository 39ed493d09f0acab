//! Run manifest: the persisted record of one collection run
//!
//! Written after collection finishes; its `finished_at` field is the stage
//! marker for `Collected`. Page hashes recorded here are re-checked during
//! archive verification so raw deletion never follows a bad artifact.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::{BundleLayout, RunId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run: RunId,
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Set when collection finished; its presence marks the Collected stage.
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Terms whose fetch failed after retries. Recorded, not fatal.
    #[serde(default)]
    pub failed_terms: Vec<String>,
    /// Per-page blake3 content hashes (filename → full hex hash).
    #[serde(default)]
    pub page_hashes: BTreeMap<String, String>,
    /// Newest marker observed per normalized term in this run.
    #[serde(default)]
    pub newest_markers: BTreeMap<String, u64>,
}

impl RunManifest {
    pub fn new(run: RunId) -> Self {
        Self {
            run,
            started_at: run.timestamp(),
            finished_at: None,
            failed_terms: Vec::new(),
            page_hashes: BTreeMap::new(),
            newest_markers: BTreeMap::new(),
        }
    }

    /// Hash every raw page of the run, sorted for deterministic order.
    pub fn compute_page_hashes(
        layout: &BundleLayout,
        run: &RunId,
    ) -> Result<BTreeMap<String, String>> {
        let mut hashes = BTreeMap::new();
        for path in layout.raw_page_paths(run)? {
            let h = hash_file(&path)
                .with_context(|| format!("failed to hash {}", path.display()))?;
            let name = path
                .file_name()
                .expect("page path has filename")
                .to_string_lossy()
                .into_owned();
            hashes.insert(name, h.to_hex().to_string());
        }
        Ok(hashes)
    }

    /// Write the manifest atomically (temp file + rename).
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename {} into place", tmp.display()))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Blake3 hash of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_run() -> RunId {
        RunId::from_datetime(chrono::Utc.with_ymd_and_hms(2016, 3, 15, 9, 30, 0).unwrap())
    }

    #[test]
    fn manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let run = fixed_run();
        let mut manifest = RunManifest::new(run);
        manifest.finished_at = Some(chrono::Utc::now());
        manifest.failed_terms.push("rahm".into());
        manifest.newest_markers.insert("rahm".into(), 105);

        let path = dir.path().join("runs").join(format!("{run}.json"));
        manifest.write_to(&path).unwrap();
        let loaded = RunManifest::read_from(&path).unwrap();
        assert_eq!(loaded.run, run);
        assert_eq!(loaded.failed_terms, vec!["rahm"]);
        assert_eq!(loaded.newest_markers.get("rahm"), Some(&105));
        assert!(loaded.finished_at.is_some());
    }

    #[test]
    fn read_missing_manifest_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunManifest::read_from(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn read_corrupt_manifest_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(RunManifest::read_from(&path).is_err());
    }

    #[test]
    fn page_hashes_cover_all_pages() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        let raw = layout.run_raw_dir(&run);
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("rahm_0000.json"), b"page a").unwrap();
        std::fs::write(raw.join("rahm_0001.json"), b"page b").unwrap();

        let hashes = RunManifest::compute_page_hashes(&layout, &run).unwrap();
        assert_eq!(hashes.len(), 2);
        assert_ne!(
            hashes.get("rahm_0000.json"),
            hashes.get("rahm_0001.json")
        );
    }

    #[test]
    fn page_hashes_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = fixed_run();
        let raw = layout.run_raw_dir(&run);
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("a_0000.json"), b"data").unwrap();

        let h1 = RunManifest::compute_page_hashes(&layout, &run).unwrap();
        let h2 = RunManifest::compute_page_hashes(&layout, &run).unwrap();
        assert_eq!(h1, h2);
    }
}
