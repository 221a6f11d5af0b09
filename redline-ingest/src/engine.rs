//! The batched ingestion engine.
//!
//! Batches are processed strictly in order on one worker: read each file,
//! normalize it, concatenate the batch's survivors in file order, write them
//! to the store as one operation, drop them, move on. One bad file never
//! aborts a batch; a failed store write always aborts the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use redline_core::batch::plan;
use redline_core::classify::FileDescriptor;
use redline_core::normalize::normalize;
use redline_core::progress::{ProgressCallback, ProgressTracker};
use redline_core::read::{read_table, FormatError};
use redline_core::schema::{to_records, CanonicalRecord, SchemaError};
use redline_core::store::{StoreError, TickerStore};

use crate::config::{ConfigError, IngestConfig};

/// Why one file was skipped. Always recoverable: recorded and moved past.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One skipped file with its reason, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: std::path::PathBuf,
    pub batch_index: usize,
    pub reason: String,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: usize,
    /// Files that normalized to at least one row and were persisted.
    pub success_count: usize,
    /// Files skipped because of read/parse/normalize errors.
    pub error_count: usize,
    /// Files that parsed fine but normalized to zero rows.
    pub empty_count: usize,
    /// Rows written to the store by this batch (0 when nothing succeeded).
    pub rows_written: usize,
    pub failures: Vec<FileFailure>,
}

impl BatchResult {
    fn new(batch_index: usize) -> Self {
        Self {
            batch_index,
            ..Default::default()
        }
    }
}

/// Whether a batch write initializes the table or extends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// First successful batch of a run: drop any prior table and recreate.
    CreateOrReplace,
    /// Every batch after: insert without touching the schema.
    Append,
}

/// A store write failure carrying the batch's accounting up to the point of
/// failure, so the run report stays complete.
#[derive(Debug)]
pub struct BatchStoreFailure {
    pub source: StoreError,
    pub result: BatchResult,
}

/// Aggregate outcome of a run, available whether the run completed, was
/// cancelled, or aborted on a store failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub empty: usize,
    pub rows_written: usize,
    pub cancelled: bool,
    pub elapsed_seconds: f64,
    pub batches: Vec<BatchResult>,
}

impl RunSummary {
    /// Every per-file failure across all batches.
    pub fn failures(&self) -> impl Iterator<Item = &FileFailure> {
        self.batches.iter().flat_map(|b| b.failures.iter())
    }

    fn fold(&mut self, result: BatchResult) {
        self.succeeded += result.success_count;
        self.failed += result.error_count;
        self.empty += result.empty_count;
        self.rows_written += result.rows_written;
        self.batches.push(result);
    }
}

/// Errors that abort a run. Per-file problems never land here; they live in
/// the summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("store write failed: {source}")]
    Store {
        source: StoreError,
        /// Accounting up to the failed write.
        summary: RunSummary,
    },
}

/// The batched ingestion engine. Owns nothing but its configuration; the
/// store connection belongs to the caller for exactly one run at a time.
pub struct IngestEngine {
    config: IngestConfig,
}

impl IngestEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: IngestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Read and normalize one file into typed records.
    fn process_file(&self, fd: &FileDescriptor) -> Result<Vec<CanonicalRecord>, FileError> {
        let raw = read_table(&fd.path, fd.format)?;
        let normalized = normalize(raw, fd.format, &self.config.normalize_options())?;
        Ok(to_records(&normalized)?)
    }

    /// Process one batch: per-file skip-and-continue, then a single store
    /// write for everything that survived.
    ///
    /// The cancellation flag is checked between files only; files already
    /// normalized when cancellation is observed are still written.
    pub fn process_batch(
        &self,
        batch_index: usize,
        files: &[FileDescriptor],
        store: &TickerStore,
        mode: WriteMode,
        tracker: Option<&ProgressTracker>,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchResult, BatchStoreFailure> {
        let mut result = BatchResult::new(batch_index);
        let mut batch_records: Vec<CanonicalRecord> = Vec::new();

        for fd in files {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                break;
            }

            match self.process_file(fd) {
                Ok(records) if records.is_empty() => {
                    log::debug!("{} normalized to zero rows", fd.path.display());
                    result.empty_count += 1;
                }
                Ok(records) => {
                    batch_records.extend(records);
                    result.success_count += 1;
                }
                Err(e) => {
                    log::warn!("skipping {}: {e}", fd.path.display());
                    result.error_count += 1;
                    result.failures.push(FileFailure {
                        path: fd.path.clone(),
                        batch_index,
                        reason: e.to_string(),
                    });
                }
            }

            if let Some(t) = tracker {
                t.update(1, Some(batch_index));
            }
        }

        if !batch_records.is_empty() {
            let write = match mode {
                WriteMode::CreateOrReplace => {
                    store.create_or_replace(&self.config.table_name, &batch_records)
                }
                WriteMode::Append => store.append(&self.config.table_name, &batch_records),
            };
            if let Err(source) = write {
                return Err(BatchStoreFailure { source, result });
            }
            result.rows_written = batch_records.len();
        }

        if let Some(t) = tracker {
            t.update(0, Some(batch_index));
        }

        Ok(result)
    }

    /// Process every batch strictly in order.
    ///
    /// Batch n+1 never starts before batch n's store write has returned, so
    /// physical row order in the table follows batch order. Per-file errors
    /// accumulate in the summary; only a store failure aborts, and even then
    /// the partial summary rides along in the error.
    pub fn process_all(
        &self,
        files: &[FileDescriptor],
        store: &TickerStore,
        progress_cb: Option<ProgressCallback>,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunSummary, RunError> {
        let start = Instant::now();

        let mut tracker = ProgressTracker::new(files.len(), self.config.batch_size);
        if let Some(cb) = progress_cb {
            tracker = tracker.with_callback(cb);
        }

        let batches = plan(files, self.config.batch_size);
        log::info!(
            "processing {} files in {} batches of up to {}",
            files.len(),
            batches.len(),
            self.config.batch_size
        );

        let mut summary = RunSummary {
            total_files: files.len(),
            ..Default::default()
        };
        let mut table_created = false;

        for (batch_index, batch) in batches.iter().enumerate() {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                break;
            }

            let mode = if table_created {
                WriteMode::Append
            } else {
                WriteMode::CreateOrReplace
            };

            let result = match self.process_batch(
                batch_index,
                batch,
                store,
                mode,
                Some(&tracker),
                cancel,
            ) {
                Ok(result) => result,
                Err(failure) => {
                    summary.fold(failure.result);
                    summary.elapsed_seconds = start.elapsed().as_secs_f64();
                    log::error!("aborting run: {}", failure.source);
                    return Err(RunError::Store {
                        source: failure.source,
                        summary,
                    });
                }
            };

            if result.rows_written > 0 {
                table_created = true;
            }

            log::info!(
                "batch {}/{}: {} ok, {} failed, {} rows",
                batch_index + 1,
                batches.len(),
                result.success_count,
                result.error_count,
                result.rows_written
            );
            summary.fold(result);
        }

        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            summary.cancelled = true;
        }
        summary.elapsed_seconds = start.elapsed().as_secs_f64();
        Ok(summary)
    }
}
