//! Ingestion across every supported input format, plus export round-trips.

use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use redline_core::classify::FileFormat;
use redline_core::read::read_table;
use redline_core::schema::{records_to_frame, to_records, CanonicalRecord};
use redline_core::store::{TickerStore, DEFAULT_TABLE};
use redline_ingest::{classify_paths, export_table, IngestConfig, IngestEngine};

fn sample_records(format: &str) -> Vec<CanonicalRecord> {
    (0..4)
        .map(|i| CanonicalRecord {
            ticker: "AAPL".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2 + i)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            open: Some(184.0 + i as f64),
            high: Some(186.0 + i as f64),
            low: Some(183.0 + i as f64),
            close: 185.0 + i as f64,
            vol: Some(1000.0),
            openint: Some(0.0),
            format: format.into(),
        })
        .collect()
}

fn ingest_single(path: PathBuf, config: IngestConfig) -> (TickerStore, usize) {
    let classified = classify_paths(&[path], &config);
    assert_eq!(classified.files.len(), 1, "file failed classification");

    let engine = IngestEngine::new(config).unwrap();
    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine
        .process_all(&classified.files, &store, None, None)
        .unwrap();
    assert_eq!(summary.failed, 0);
    let rows = store.row_count(DEFAULT_TABLE).unwrap();
    (store, rows)
}

#[test]
fn ingests_generic_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bars.csv");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "ticker,timestamp,open,high,low,close,vol").unwrap();
    writeln!(f, "AAPL,2024-01-02 09:30:00,184.2,185.9,183.4,185.1,1000").unwrap();
    writeln!(f, "AAPL,2024-01-03 09:30:00,185.0,186.4,184.1,184.3,1100").unwrap();

    let (store, rows) = ingest_single(path, IngestConfig::default());
    assert_eq!(rows, 2);

    let records = store.read_records(DEFAULT_TABLE).unwrap();
    assert_eq!(records[0].ticker, "AAPL");
    assert_eq!(records[0].close, 185.1);
    assert_eq!(records[0].format, "csv");
    assert_eq!(records[0].openint, None);
}

#[test]
fn ingests_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bars.json");
    std::fs::write(
        &path,
        concat!(
            r#"{"ticker":"MSFT","timestamp":"2024-01-02 09:30:00","open":370.0,"high":372.0,"low":369.0,"close":371.2,"vol":500.0}"#,
            "\n",
            r#"{"ticker":"MSFT","timestamp":"2024-01-03 09:30:00","open":371.0,"high":373.5,"low":370.2,"close":372.8,"vol":600.0}"#,
            "\n",
        ),
    )
    .unwrap();

    let (store, rows) = ingest_single(path, IngestConfig::default());
    assert_eq!(rows, 2);
    let records = store.read_records(DEFAULT_TABLE).unwrap();
    assert_eq!(records[1].close, 372.8);
    assert_eq!(records[1].format, "json");
}

#[test]
fn ingests_parquet() {
    use polars::prelude::*;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bars.parquet");
    let mut df = records_to_frame(&sample_records("parquet")).unwrap();
    ParquetWriter::new(std::fs::File::create(&path).unwrap())
        .finish(&mut df)
        .unwrap();

    let (store, rows) = ingest_single(path, IngestConfig::default());
    assert_eq!(rows, 4);
    let records = store.read_records(DEFAULT_TABLE).unwrap();
    assert_eq!(records[0].format, "parquet");
    assert_eq!(records[3].close, 188.0);
}

#[test]
fn ingests_feather() {
    use polars::prelude::*;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bars.feather");
    let mut df = records_to_frame(&sample_records("feather")).unwrap();
    IpcWriter::new(std::fs::File::create(&path).unwrap())
        .finish(&mut df)
        .unwrap();

    let (_store, rows) = ingest_single(path, IngestConfig::default());
    assert_eq!(rows, 4);
}

#[test]
fn ingests_a_previous_runs_duckdb_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("previous.duckdb");

    {
        let source = TickerStore::open(&path).unwrap();
        source
            .create_or_replace(DEFAULT_TABLE, &sample_records("txt"))
            .unwrap();
        // Connection closes when `source` drops.
    }

    let (store, rows) = ingest_single(path, IngestConfig::default());
    assert_eq!(rows, 4);
    let records = store.read_records(DEFAULT_TABLE).unwrap();
    // Retagged with the format it was read from this time around.
    assert_eq!(records[0].format, "duckdb");
    assert_eq!(records[0].close, 185.0);
}

fn populated_store() -> TickerStore {
    let store = TickerStore::open_in_memory().unwrap();
    store
        .create_or_replace(DEFAULT_TABLE, &sample_records("txt"))
        .unwrap();
    store
}

fn closes(records: &[CanonicalRecord]) -> Vec<f64> {
    records.iter().map(|r| r.close).collect()
}

#[test]
fn export_to_parquet_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.parquet");
    let store = populated_store();

    export_table(&store, DEFAULT_TABLE, &path, FileFormat::Parquet).unwrap();

    let df = read_table(&path, FileFormat::Parquet).unwrap();
    let records = to_records(&df).unwrap();
    assert_eq!(records, store.read_records(DEFAULT_TABLE).unwrap());
}

#[test]
fn export_to_csv_reingests_with_same_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");
    let store = populated_store();

    export_table(&store, DEFAULT_TABLE, &path, FileFormat::Csv).unwrap();
    let (reingested, rows) = ingest_single(path, IngestConfig::default());

    assert_eq!(rows, 4);
    assert_eq!(
        closes(&reingested.read_records(DEFAULT_TABLE).unwrap()),
        closes(&store.read_records(DEFAULT_TABLE).unwrap())
    );
}

#[test]
fn export_to_duckdb_produces_a_loadable_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.duckdb");
    let store = populated_store();

    export_table(&store, DEFAULT_TABLE, &path, FileFormat::Duckdb).unwrap();

    let target = TickerStore::open(&path).unwrap();
    assert_eq!(target.row_count(DEFAULT_TABLE).unwrap(), 4);
}

#[test]
fn txt_export_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.txt");
    let store = populated_store();

    let result = export_table(&store, DEFAULT_TABLE, &path, FileFormat::Txt);
    assert!(result.is_err());
}

#[test]
fn mixed_formats_in_one_run() {
    let dir = tempfile::tempdir().unwrap();

    let txt = dir.path().join("stooq.txt");
    std::fs::write(
        &txt,
        "<TICKER>,<DATE>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>\nSPY,20240102,093000,470.0,471.5,469.2,471.0,9000\n",
    )
    .unwrap();

    let csv = dir.path().join("bars.csv");
    std::fs::write(
        &csv,
        "ticker,timestamp,open,high,low,close,vol\nQQQ,2024-01-02 09:30:00,400.1,402.0,399.5,401.3,7000\n",
    )
    .unwrap();

    let config = IngestConfig {
        year_range: Some((1900, 2100)),
        ..Default::default()
    };
    let classified = classify_paths(&[txt, csv], &config);
    assert_eq!(classified.files.len(), 2);

    let engine = IngestEngine::new(config).unwrap();
    let store = TickerStore::open_in_memory().unwrap();
    let summary = engine
        .process_all(&classified.files, &store, None, None)
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    let records = store.read_records(DEFAULT_TABLE).unwrap();
    let formats: Vec<&str> = records.iter().map(|r| r.format.as_str()).collect();
    assert_eq!(formats, vec!["txt", "csv"]);
}
