//! REDLINE Ingest — batched, memory-bounded ingestion orchestration.
//!
//! This crate builds on `redline-core` to provide:
//! - Explicit run configuration (TOML-loadable, no global state)
//! - Input discovery and up-front classification
//! - The batch-at-a-time ingestion engine with skip-and-continue per-file
//!   error handling and cooperative cancellation
//! - Run summaries, failure reports, and table export

pub mod config;
pub mod discover;
pub mod engine;
pub mod report;

pub use config::{ConfigError, IngestConfig};
pub use discover::{classify_paths, find_stooq_files, Classified, SkippedFile};
pub use engine::{
    BatchResult, BatchStoreFailure, FileError, FileFailure, IngestEngine, RunError, RunSummary,
    WriteMode,
};
pub use report::{export_table, summary_json, write_failures_csv, write_summary_json};
