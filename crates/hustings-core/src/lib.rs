//! Hustings Core - Common infrastructure for the collection pipeline
//!
//! This crate provides reusable components shared by the collector,
//! reducer, and archiver: logging, retry/backoff, work distribution,
//! progress reporting, and graceful shutdown.

pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use logging::init_logging;
pub use progress::ProgressContext;
pub use retry::backoff_duration;
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag};
pub use work_queue::WorkQueue;
