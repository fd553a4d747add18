//! Pipeline orchestration for vulnfeed.
//!
//! Loads a feed's checkpoint, ingests vendor records through an adapter's
//! fetcher or decoder, converts them to NVD CVE items, writes them to a
//! sink, and advances the checkpoint once delivery is confirmed.

pub mod checkpoint;
pub mod config;
pub(crate) mod emit;
pub mod errors;
pub mod execution;
pub mod orchestrator;
pub mod resolve;
pub mod result;
pub mod sink;

// Re-export public API for convenience
pub use errors::PipelineError;
pub use execution::ExecutionOptions;
pub use orchestrator::{DownloadSummary, Ingest, Runner};
pub use result::{RunCounts, RunResult, RunState};
pub use sink::{JsonSink, Sink, VecSink};
