//! REDLINE Core — mechanisms for normalizing heterogeneous market-data
//! files into one canonical table.
//!
//! This crate contains the pieces the ingestion engine is built from:
//! - Canonical schema and the typed `CanonicalRecord` boundary
//! - File classification (extension table + Stooq header probe)
//! - Per-format table readers
//! - Schema normalization with explicit null-filtering policies
//! - Batch planning
//! - Progress tracking with rate/ETA
//! - The DuckDB persistent-store adapter

pub mod batch;
pub mod classify;
pub mod normalize;
pub mod progress;
pub mod read;
pub mod schema;
pub mod store;

pub use classify::{classify, is_valid_stooq, ClassifyError, FileDescriptor, FileFormat};
pub use normalize::{normalize, NormalizeOptions, NullPolicy};
pub use progress::{ProgressCallback, ProgressSnapshot, ProgressTracker};
pub use read::{read_table, FormatError};
pub use schema::{records_to_frame, to_records, CanonicalRecord, CanonicalSchema, SchemaError};
pub use store::{StoreError, TableInfo, TickerStore, DEFAULT_TABLE};
