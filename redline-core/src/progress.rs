//! Progress tracking for long-running batch operations: processed counts,
//! smoothed throughput, and an ETA, delivered to a caller-supplied callback.
//!
//! The callback is the only contract between the pipeline and whatever
//! presentation layer is watching it; marshalling to a UI thread is the
//! presentation layer's problem, not ours.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::Instant;

/// Callback invoked with an immutable snapshot after every update.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Point-in-time view of a run's progress. Immutable once built; valid for
/// the duration of one callback invocation.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub items_done: usize,
    pub items_total: usize,
    /// 1-based index of the batch currently in flight (0 before any batch).
    pub batch_index: usize,
    pub batch_total: usize,
    pub items_per_second: f64,
    pub eta_seconds: f64,
    pub start_time: Instant,
}

impl ProgressSnapshot {
    /// Completion percentage; 0 when there is nothing to do.
    pub fn percentage(&self) -> f64 {
        if self.items_total == 0 {
            return 0.0;
        }
        (self.items_done as f64 / self.items_total as f64) * 100.0
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Human-readable ETA: seconds under a minute, minutes under an hour,
    /// hours beyond.
    pub fn eta_formatted(&self) -> String {
        format_eta(self.eta_seconds)
    }
}

pub fn format_eta(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.0}s")
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

struct TrackerState {
    current_item: usize,
    current_batch: usize,
    last_update: Instant,
    items_per_second: f64,
}

/// Tracks progress across a batched run.
///
/// `update` mutates counters, recomputes rate/ETA, and invokes the callback
/// all inside one critical section, so concurrent callers can never observe
/// a torn snapshot or interleaved updates.
pub struct ProgressTracker {
    total_items: usize,
    batch_total: usize,
    start_time: Instant,
    state: Mutex<TrackerState>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total_items: usize, batch_size: usize) -> Self {
        let now = Instant::now();
        Self {
            total_items,
            batch_total: if batch_size == 0 {
                0
            } else {
                crate::batch::batch_count(total_items, batch_size)
            },
            start_time: now,
            state: Mutex::new(TrackerState {
                current_item: 0,
                current_batch: 0,
                last_update: now,
                items_per_second: 0.0,
            }),
            callback: None,
        }
    }

    /// Register the progress sink. Replaces any previous callback.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Record `items_processed` more items; when `batch_index` is given the
    /// current batch advances to `batch_index + 1` (1-based for display).
    ///
    /// A panicking callback is caught and logged; progress reporting must
    /// never abort ingestion.
    pub fn update(&self, items_processed: usize, batch_index: Option<usize>) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        state.current_item += items_processed;
        if let Some(idx) = batch_index {
            state.current_batch = idx + 1;
        }

        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        if elapsed > 0.0 {
            state.items_per_second = items_processed as f64 / elapsed;
        }

        let remaining = self.total_items.saturating_sub(state.current_item);
        let eta_seconds = if state.items_per_second > 0.0 {
            remaining as f64 / state.items_per_second
        } else {
            0.0
        };

        let snapshot = ProgressSnapshot {
            items_done: state.current_item,
            items_total: self.total_items,
            batch_index: state.current_batch,
            batch_total: self.batch_total,
            items_per_second: state.items_per_second,
            eta_seconds,
            start_time: self.start_time,
        };

        if let Some(cb) = &self.callback {
            if catch_unwind(AssertUnwindSafe(|| cb(&snapshot))).is_err() {
                log::error!("progress callback panicked; continuing ingestion");
            }
        }

        state.last_update = now;
    }

    /// Current progress without mutating anything.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().unwrap();
        let remaining = self.total_items.saturating_sub(state.current_item);
        let eta_seconds = if state.items_per_second > 0.0 {
            remaining as f64 / state.items_per_second
        } else {
            0.0
        };
        ProgressSnapshot {
            items_done: state.current_item,
            items_total: self.total_items,
            batch_index: state.current_batch,
            batch_total: self.batch_total,
            items_per_second: state.items_per_second,
            eta_seconds,
            start_time: self.start_time,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().current_item >= self.total_items
    }
}
