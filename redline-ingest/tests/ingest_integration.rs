//! End-to-end tests for the batched ingestion pipeline: temp Stooq files in,
//! canonical DuckDB table out.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use redline_core::progress::ProgressSnapshot;
use redline_core::store::TickerStore;
use redline_ingest::{classify_paths, IngestConfig, IngestEngine, WriteMode};

const STOOQ_HEADER: &str =
    "<TICKER>,<PER>,<DATE>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>,<OPENINT>\n";

/// Write a Stooq file with `rows` bars for `ticker`, one per day.
fn stooq_file(dir: &Path, name: &str, ticker: &str, rows: usize) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(STOOQ_HEADER.as_bytes()).unwrap();
    for i in 0..rows {
        let close = 100.0 + i as f64;
        writeln!(
            f,
            "{ticker},D,202401{:02},093000,{},{},{},{close},1000,0",
            (i % 27) + 1,
            close - 0.5,
            close + 1.0,
            close - 1.0,
        )
        .unwrap();
    }
    path
}

/// A file whose header is valid Stooq but whose body cannot be parsed as a
/// table at all (a row with more fields than the header defines).
fn corrupt_stooq_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(STOOQ_HEADER.as_bytes()).unwrap();
    f.write_all(b"AAPL,D,20240102,093000,1,2,3,4,5,6,7,8,9,10,11\n")
        .unwrap();
    path
}

fn engine(batch_size: usize) -> IngestEngine {
    IngestEngine::new(IngestConfig {
        batch_size,
        year_range: Some((1900, 2100)),
        ..Default::default()
    })
    .unwrap()
}

fn classify_all(paths: &[PathBuf]) -> Vec<redline_core::classify::FileDescriptor> {
    let classified = classify_paths(paths, &IngestConfig::default());
    assert!(classified.skipped.is_empty(), "unexpected skips");
    classified.files
}

#[test]
fn five_files_batch_size_two_yields_three_batches() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..5)
        .map(|i| stooq_file(dir.path(), &format!("t{i}.txt"), &format!("TK{i}"), 3 + i))
        .collect();
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(2).process_all(&files, &store, None, None).unwrap();

    assert_eq!(summary.batches.len(), 3);
    assert_eq!(
        summary
            .batches
            .iter()
            .map(|b| b.success_count)
            .collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);

    // 3+4+5+6+7 valid rows across the five files
    let info = store.describe("tickers_data").unwrap();
    assert_eq!(info.row_count, 25);
    assert_eq!(summary.rows_written, 25);
}

#[test]
fn one_corrupt_file_does_not_abort_its_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        stooq_file(dir.path(), "a.txt", "AAA", 2),
        corrupt_stooq_file(dir.path(), "broken.txt"),
        stooq_file(dir.path(), "c.txt", "CCC", 2),
    ];
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(10).process_all(&files, &store, None, None).unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let failures: Vec<_> = summary.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].path.ends_with("broken.txt"));
    assert!(!failures[0].reason.is_empty());

    // Valid rows still persisted
    assert_eq!(store.row_count("tickers_data").unwrap(), 4);
}

#[test]
fn invalid_stooq_header_is_excluded_before_batching() {
    let dir = tempfile::tempdir().unwrap();
    let good = stooq_file(dir.path(), "good.txt", "AAA", 2);
    let bad = dir.path().join("no_vol.txt");
    std::fs::write(
        &bad,
        "<TICKER>,<DATE>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>\nAAA,20240102,093000,1,2,0.5,1.5\n",
    )
    .unwrap();

    let classified = classify_paths(&[good, bad], &IngestConfig::default());
    assert_eq!(classified.files.len(), 1);
    assert_eq!(classified.skipped.len(), 1);

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(100)
        .process_all(&classified.files, &store, None, None)
        .unwrap();
    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.succeeded, 1);
}

#[test]
fn two_runs_produce_identical_tables() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..6)
        .map(|i| stooq_file(dir.path(), &format!("t{i}.txt"), &format!("TK{i}"), 4))
        .collect();
    let files = classify_all(&paths);

    let first = TickerStore::open_in_memory().unwrap();
    let second = TickerStore::open_in_memory().unwrap();

    engine(2).process_all(&files, &first, None, None).unwrap();
    engine(2).process_all(&files, &second, None, None).unwrap();

    assert_eq!(
        first.fingerprint("tickers_data").unwrap(),
        second.fingerprint("tickers_data").unwrap()
    );
}

#[test]
fn rows_land_in_batch_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        stooq_file(dir.path(), "1.txt", "AAA", 1),
        stooq_file(dir.path(), "2.txt", "BBB", 1),
        stooq_file(dir.path(), "3.txt", "CCC", 1),
        stooq_file(dir.path(), "4.txt", "DDD", 1),
    ];
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    engine(2).process_all(&files, &store, None, None).unwrap();

    let records = store.read_records("tickers_data").unwrap();
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["AAA", "BBB", "CCC", "DDD"]);
}

#[test]
fn progress_updates_fire_per_file_and_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..5)
        .map(|i| stooq_file(dir.path(), &format!("t{i}.txt"), &format!("TK{i}"), 2))
        .collect();
    let files = classify_all(&paths);

    let snapshots: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let callback = Box::new(move |snap: &ProgressSnapshot| {
        sink.lock()
            .unwrap()
            .push((snap.items_done, snap.batch_index));
    });

    let store = TickerStore::open_in_memory().unwrap();
    engine(2)
        .process_all(&files, &store, Some(callback), None)
        .unwrap();

    let seen = snapshots.lock().unwrap();
    // 5 per-file updates plus 3 batch-completion updates
    assert_eq!(seen.len(), 8);
    assert_eq!(seen.last().unwrap(), &(5, 3));
    // items_done never decreases
    for pair in seen.windows(2) {
        assert!(pair[1].0 >= pair[0].0);
    }
}

#[test]
fn tracker_percentage_scenario() {
    use redline_core::progress::ProgressTracker;

    let tracker = ProgressTracker::new(250, 100);
    tracker.update(100, Some(0));

    let snap = tracker.snapshot();
    assert_eq!(snap.percentage(), 40.0);
    assert_eq!(snap.batch_index, 1);
}

#[test]
fn cancellation_stops_after_current_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..6)
        .map(|i| stooq_file(dir.path(), &format!("t{i}.txt"), &format!("TK{i}"), 1))
        .collect();
    let files = classify_all(&paths);

    let cancel = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&cancel);
    // Request cancellation once the first batch's files are done.
    let callback = Box::new(move |snap: &ProgressSnapshot| {
        if snap.items_done >= 2 {
            trigger.store(true, Ordering::Relaxed);
        }
    });

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(2)
        .process_all(&files, &store, Some(callback), Some(&cancel))
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.batches.len(), 1);
    // The first batch's rows were still appended before stopping.
    assert_eq!(store.row_count("tickers_data").unwrap(), 2);
}

#[test]
fn fully_failed_run_reports_zero_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        corrupt_stooq_file(dir.path(), "b1.txt"),
        corrupt_stooq_file(dir.path(), "b2.txt"),
    ];
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(1).process_all(&files, &store, None, None).unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.rows_written, 0);
    // No batch succeeded, so the table was never created.
    assert!(store.describe("tickers_data").is_err());
}

#[test]
fn header_only_file_counts_as_empty_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let header_only = dir.path().join("header_only.txt");
    std::fs::write(&header_only, STOOQ_HEADER).unwrap();
    let paths = vec![stooq_file(dir.path(), "full.txt", "AAA", 3), header_only];
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(10).process_all(&files, &store, None, None).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.empty, 1);
    assert_eq!(store.row_count("tickers_data").unwrap(), 3);
}

#[test]
fn append_into_missing_table_surfaces_store_failure_with_accounting() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![stooq_file(dir.path(), "a.txt", "AAA", 2)];
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    let result = engine(10).process_batch(0, &files, &store, WriteMode::Append, None, None);

    let failure = result.unwrap_err();
    // The batch's per-file accounting survives the store failure.
    assert_eq!(failure.result.success_count, 1);
    assert!(failure.source.to_string().contains("duckdb"));
}

#[test]
fn table_created_on_first_successful_batch_not_batch_zero() {
    let dir = tempfile::tempdir().unwrap();
    // Batch 0 is entirely corrupt; batch 1 carries the good file. The good
    // batch must create the table rather than append into nothing.
    let paths = vec![
        corrupt_stooq_file(dir.path(), "bad.txt"),
        stooq_file(dir.path(), "good.txt", "AAA", 2),
    ];
    let files = classify_all(&paths);

    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine(1).process_all(&files, &store, None, None).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(store.row_count("tickers_data").unwrap(), 2);
}
