//! Batch planning: partition an ordered file list into fixed-size groups so
//! the engine only ever materializes one group's tables at a time.

/// Number of batches needed for `n` items at `batch_size` per batch.
///
/// `batch_size` must be positive; callers validate it at the configuration
/// boundary.
pub fn batch_count(n: usize, batch_size: usize) -> usize {
    n.div_ceil(batch_size)
}

/// Partition `items` into contiguous, non-overlapping slices of at most
/// `batch_size` elements. Batch `i` covers `[i*B, min((i+1)*B, N))`; the
/// last batch may be short, and an empty input yields zero batches.
pub fn plan<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    items.chunks(batch_size).collect()
}
