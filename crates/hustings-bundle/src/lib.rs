//! hustings-bundle: the on-disk bundle format
//!
//! A bundle is a directory holding everything for one tracked subject area:
//!
//! ```text
//! [bundle root]/
//!     config.toml       -- the races, candidates, and search terms
//!     credentials.toml  -- API credentials
//!     watermarks.json   -- per-term last-seen markers
//!     raw/<run>/        -- raw search result pages, one file per page
//!     runs/<run>.json   -- per-run manifest (stage marker, page hashes)
//!     reduced/<run>.json -- deduplicated analysis records
//!     archived/<run>.zip -- compressed raw pages, post-verification
//! ```
//!
//! This crate owns the configuration model, run identifiers, the run stage
//! state machine, and the watermark store. It never talks to the network.

pub mod config;
pub mod layout;
pub mod manifest;
pub mod stage;
pub mod watermark;

pub use config::{BundleConfig, Candidate, Credentials, Race, TermIndex, normalize_term, term_slug};
pub use layout::{BundleLayout, RunId};
pub use manifest::RunManifest;
pub use stage::RunStage;
pub use watermark::{Watermark, WatermarkStore};
