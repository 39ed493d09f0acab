//! hustings-reduce: raw pages to deduplicated analysis records
//!
//! Raw responses are the only input; output is one JSON file of
//! [`ReducedRecord`] per run. Reduction never mutates raw pages, so it can
//! be re-run safely until the run is archived.

pub mod record;
pub mod transform;

pub use record::{ReducedRecord, RepostRecord};
pub use transform::{dedupe, expand, reduce, reduce_run};
