//! Bundle configuration: races, candidates, and search terms
//!
//! Loaded once from `config.toml`, validated, and consumed read-only by the
//! collector and reducer. The term→candidate lookup is built here as an
//! immutable index so reduction never consults mutable shared state.

use std::path::Path;

use anyhow::{Context, Result};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Top-level bundle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    #[serde(rename = "race", default)]
    pub races: Vec<Race>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Race {
    pub name: String,
    pub year: i32,
    #[serde(rename = "candidate", default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    /// Inactive candidates keep their historical data but are excluded
    /// from new runs.
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub terms: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Filesystem-friendly slug for a race or candidate name.
pub fn slug_for(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

impl Race {
    pub fn slug(&self) -> String {
        slug_for(&self.name)
    }
}

impl BundleConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot act on: empty names,
    /// termless candidates, or one term claimed by two candidates.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.races.is_empty(), "config has no races");
        for race in &self.races {
            anyhow::ensure!(!race.name.trim().is_empty(), "race with empty name");
            for candidate in &race.candidates {
                anyhow::ensure!(
                    !candidate.name.trim().is_empty(),
                    "candidate with empty name in race {}",
                    race.name
                );
                anyhow::ensure!(
                    !candidate.terms.is_empty(),
                    "candidate {} has no search terms",
                    candidate.name
                );
            }
        }
        // Building the index enforces unique term ownership
        TermIndex::build(self)?;
        Ok(())
    }
}

/// API credentials, stored next to the config in `credentials.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub app_key: String,
    pub access_token: String,
}

impl Credentials {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid credentials {}", path.display()))
    }

    /// Bearer token for the search API. The access token carries the grant;
    /// the app key only identifies the registered application.
    pub fn bearer_token(&self) -> String {
        self.access_token.clone()
    }
}

/// Canonical form of a search term.
///
/// Queries come back from the API percent-encoded with `+` for spaces, so
/// terms are compared after decoding, whitespace collapse, and lowercasing.
pub fn normalize_term(raw: &str) -> String {
    let plussed = raw.replace('+', " ");
    let decoded = percent_decode_str(&plussed).decode_utf8_lossy();
    decoded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Filename-safe encoding of a normalized term, used in raw page names.
/// Percent-encoding keeps distinct terms distinct on disk.
pub fn term_slug(raw: &str) -> String {
    utf8_percent_encode(&normalize_term(raw), NON_ALPHANUMERIC).to_string()
}

/// Immutable lookup from normalized term to owning candidate name.
///
/// Built once at configuration load and passed by reference into the
/// fetcher and reducer.
#[derive(Debug, Clone)]
pub struct TermIndex {
    map: FxHashMap<String, String>,
}

impl TermIndex {
    pub fn build(config: &BundleConfig) -> Result<Self> {
        let mut map = FxHashMap::default();
        for race in &config.races {
            for candidate in &race.candidates {
                for term in &candidate.terms {
                    let key = normalize_term(term);
                    anyhow::ensure!(!key.is_empty(), "empty search term for {}", candidate.name);
                    if let Some(owner) =
                        map.insert(key.clone(), candidate.name.clone())
                    {
                        anyhow::ensure!(
                            owner == candidate.name,
                            "term {term:?} is claimed by both {owner} and {}",
                            candidate.name
                        );
                    }
                }
            }
        }
        Ok(Self { map })
    }

    /// Resolve a query (raw or normalized) to its owning candidate.
    pub fn candidate_for(&self, query: &str) -> Option<&str> {
        self.map.get(&normalize_term(query)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
