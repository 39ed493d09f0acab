//! Run stage state machine
//!
//! Stages advance one way: Created → Collecting → Collected → Reduced →
//! Archived. The current stage is derived from persisted artifacts, with the
//! run manifest's `finished_at` as the explicit Collected marker, so a
//! partially written file never advances a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::layout::{BundleLayout, RunId};
use crate::manifest::RunManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Created,
    Collecting,
    Collected,
    Reduced,
    Archived,
}

impl RunStage {
    /// Derive the stage of a run from what is on disk.
    pub fn detect(layout: &BundleLayout, run: &RunId) -> Self {
        if layout.archive_path(run).exists() {
            return Self::Archived;
        }
        if reduced_is_valid(layout, run) {
            return Self::Reduced;
        }
        if let Ok(manifest) = RunManifest::read_from(&layout.manifest_path(run)) {
            if manifest.finished_at.is_some() {
                return Self::Collected;
            }
        }
        if layout.run_raw_dir(run).is_dir() {
            Self::Collecting
        } else {
            Self::Created
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Collecting => "collecting",
            Self::Collected => "collected",
            Self::Reduced => "reduced",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reduced file counts only if it parses as a record array, and an empty
/// array counts only when the run genuinely collected nothing.
fn reduced_is_valid(layout: &BundleLayout, run: &RunId) -> bool {
    let path = layout.reduced_path(run);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return false;
    };
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Array(records)) => {
            if !records.is_empty() {
                return true;
            }
            layout
                .raw_page_paths(run)
                .map(|pages| pages.is_empty())
                .unwrap_or(false)
        }
        _ => {
            log::warn!("{run}: reduced file is not a valid record array");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture() -> (tempfile::TempDir, BundleLayout, RunId) {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        let run = RunId::from_datetime(chrono::Utc.with_ymd_and_hms(2016, 3, 15, 9, 30, 0).unwrap());
        (dir, layout, run)
    }

    fn write_raw_page(layout: &BundleLayout, run: &RunId) {
        let raw = layout.run_raw_dir(run);
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("rahm_0000.json"), b"{\"posts\":[]}").unwrap();
    }

    fn write_finished_manifest(layout: &BundleLayout, run: &RunId) {
        let mut manifest = RunManifest::new(*run);
        manifest.finished_at = Some(chrono::Utc::now());
        manifest.write_to(&layout.manifest_path(run)).unwrap();
    }

    #[test]
    fn created_when_nothing_exists() {
        let (_dir, layout, run) = fixture();
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Created);
    }

    #[test]
    fn collecting_when_raw_dir_without_marker() {
        let (_dir, layout, run) = fixture();
        write_raw_page(&layout, &run);
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Collecting);
    }

    #[test]
    fn collected_when_manifest_finished() {
        let (_dir, layout, run) = fixture();
        write_raw_page(&layout, &run);
        write_finished_manifest(&layout, &run);
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Collected);
    }

    #[test]
    fn unfinished_manifest_is_still_collecting() {
        let (_dir, layout, run) = fixture();
        write_raw_page(&layout, &run);
        RunManifest::new(run)
            .write_to(&layout.manifest_path(&run))
            .unwrap();
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Collecting);
    }

    #[test]
    fn reduced_when_record_array_exists() {
        let (_dir, layout, run) = fixture();
        write_raw_page(&layout, &run);
        write_finished_manifest(&layout, &run);
        let reduced = layout.reduced_path(&run);
        std::fs::create_dir_all(reduced.parent().unwrap()).unwrap();
        std::fs::write(&reduced, br#"[{"id":42}]"#).unwrap();
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Reduced);
    }

    #[test]
    fn corrupt_reduced_file_stays_collected() {
        let (_dir, layout, run) = fixture();
        write_raw_page(&layout, &run);
        write_finished_manifest(&layout, &run);
        let reduced = layout.reduced_path(&run);
        std::fs::create_dir_all(reduced.parent().unwrap()).unwrap();
        std::fs::write(&reduced, b"{truncated").unwrap();
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Collected);
    }

    #[test]
    fn empty_reduced_requires_empty_raw() {
        let (_dir, layout, run) = fixture();
        write_raw_page(&layout, &run);
        write_finished_manifest(&layout, &run);
        let reduced = layout.reduced_path(&run);
        std::fs::create_dir_all(reduced.parent().unwrap()).unwrap();
        std::fs::write(&reduced, b"[]").unwrap();
        // Raw pages exist, so an empty reduction is suspect
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Collected);
    }

    #[test]
    fn empty_reduced_valid_for_empty_run() {
        let (_dir, layout, run) = fixture();
        std::fs::create_dir_all(layout.run_raw_dir(&run)).unwrap();
        write_finished_manifest(&layout, &run);
        let reduced = layout.reduced_path(&run);
        std::fs::create_dir_all(reduced.parent().unwrap()).unwrap();
        std::fs::write(&reduced, b"[]").unwrap();
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Reduced);
    }

    #[test]
    fn archived_wins_over_everything() {
        let (_dir, layout, run) = fixture();
        write_finished_manifest(&layout, &run);
        let archive = layout.archive_path(&run);
        std::fs::create_dir_all(archive.parent().unwrap()).unwrap();
        std::fs::write(&archive, b"zip").unwrap();
        assert_eq!(RunStage::detect(&layout, &run), RunStage::Archived);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(RunStage::Created < RunStage::Collecting);
        assert!(RunStage::Collecting < RunStage::Collected);
        assert!(RunStage::Collected < RunStage::Reduced);
        assert!(RunStage::Reduced < RunStage::Archived);
    }
}
