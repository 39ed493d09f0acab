//! hustings-collect: incremental search collection and archival
//!
//! Drives paginated searches against the social-media API, bounded below by
//! per-term watermarks, persists every page as it arrives, and compresses
//! finished runs into verified archives before the raw pages are removed.

pub mod archive;
pub mod client;
pub mod coordinator;
pub mod fetcher;
pub mod http;
pub mod model;

pub use archive::archive_run;
pub use client::{SearchClient, SearchError, SearchPage};
pub use coordinator::{CollectOptions, CollectReport, collect_run};
pub use fetcher::{DEFAULT_MAX_PAGES, FetchError, FetchOutcome, fetch_term};
pub use http::HttpSearchClient;
pub use model::{RawPage, RawPost};
