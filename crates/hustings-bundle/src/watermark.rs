//! Per-term watermarks: the newest result marker seen for each search term
//!
//! Watermarks bound later fetches so each run collects only new results.
//! The store must be durable before a marker is used (write-before-use), so
//! saves go through a temp file and atomic rename. A missing or corrupt
//! store is treated as "no prior run", never as an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::normalize_term;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Newest post id seen for the term. The API's ids increase
    /// numerically, so this is the fetch lower bound.
    pub last_id: u64,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub struct WatermarkStore {
    path: PathBuf,
    marks: BTreeMap<String, Watermark>,
}

impl WatermarkStore {
    /// Load the store, treating a missing or unreadable file as empty.
    pub fn load(path: &Path) -> Self {
        let marks = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(marks) => marks,
                Err(e) => {
                    log::warn!(
                        "corrupt watermark store {}: {e}; treating all terms as unseen",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            marks,
        }
    }

    /// In-memory store for tests.
    pub fn in_memory(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            marks: BTreeMap::new(),
        }
    }

    pub fn get(&self, term: &str) -> Option<Watermark> {
        self.marks.get(&normalize_term(term)).copied()
    }

    /// Advance a term's watermark. Markers are monotonically non-decreasing:
    /// an older marker is ignored. Returns true if the store changed.
    pub fn advance(
        &mut self,
        term: &str,
        last_id: u64,
        last_seen: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let key = normalize_term(term);
        match self.marks.get(&key) {
            Some(existing) if existing.last_id >= last_id => false,
            _ => {
                self.marks.insert(key, Watermark { last_id, last_seen });
                true
            }
        }
    }

    /// Persist the store durably (temp file + atomic rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(&self.marks).context("failed to serialize watermarks")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to rename {} into place", tmp.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatermarkStore::load(&dir.path().join("watermarks.json"));
        assert!(store.is_empty());
        assert_eq!(store.get("rahm"), None);
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        std::fs::write(&path, b"{{{{").unwrap();
        let store = WatermarkStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn advance_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WatermarkStore::in_memory(&dir.path().join("watermarks.json"));
        let now = chrono::Utc::now();

        assert!(store.advance("Rahm", 100, now));
        assert!(store.advance("Rahm", 105, now));
        // Going backwards is ignored
        assert!(!store.advance("Rahm", 99, now));
        assert!(!store.advance("Rahm", 105, now));
        assert_eq!(store.get("rahm").unwrap().last_id, 105);
    }

    #[test]
    fn keys_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WatermarkStore::in_memory(&dir.path().join("watermarks.json"));
        store.advance("Rahm+Emanuel", 10, chrono::Utc::now());
        assert_eq!(store.get("rahm emanuel").unwrap().last_id, 10);
        assert_eq!(store.get("RAHM  EMANUEL").unwrap().last_id, 10);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        let mut store = WatermarkStore::load(&path);
        store.advance("rahm", 105, chrono::Utc::now());
        store.save().unwrap();

        let reloaded = WatermarkStore::load(&path);
        assert_eq!(reloaded.get("rahm").unwrap().last_id, 105);
        // No stray temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }
}
