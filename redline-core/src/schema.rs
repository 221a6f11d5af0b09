//! Canonical schema for normalized market data.
//!
//! Every source format is mapped onto one fixed column set before anything
//! is persisted. The typed boundary is `CanonicalRecord`: a row that has
//! already passed null filtering, so ticker/timestamp/close are plain
//! (non-optional) fields.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Canonical column names, in persisted order.
pub const CANONICAL_COLUMNS: [&str; 9] = [
    "ticker", "timestamp", "open", "high", "low", "close", "vol", "openint", "format",
];

/// The numeric subset of the canonical columns (coerced to Float64).
pub const NUMERIC_COLUMNS: [&str; 6] = ["open", "high", "low", "close", "vol", "openint"];

/// Expected schema for the canonical table.
pub struct CanonicalSchema;

impl CanonicalSchema {
    /// Get the canonical schema (column names and dtypes, in order).
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("ticker".into(), DataType::String),
            Field::new(
                "timestamp".into(),
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("vol".into(), DataType::Float64),
            Field::new("openint".into(), DataType::Float64),
            Field::new("format".into(), DataType::String),
        ])
    }

    /// Validate a DataFrame against the canonical schema.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("unexpected null in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("frame conversion: {0}")]
    Frame(String),
}

/// One normalized row. Ticker, timestamp, and close can never be null here;
/// the normalizer filters violating rows before conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub ticker: String,
    pub timestamp: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub vol: Option<f64>,
    pub openint: Option<f64>,
    pub format: String,
}

/// Convert a canonical DataFrame into typed records.
///
/// The frame must already be in canonical shape (the normalizer's output).
pub fn to_records(df: &DataFrame) -> Result<Vec<CanonicalRecord>, SchemaError> {
    CanonicalSchema::validate(df)?;

    let map_err = |e: PolarsError| SchemaError::Frame(format!("column read: {e}"));

    let tickers = df.column("ticker").map_err(map_err)?.str().map_err(map_err)?;
    let timestamps = df
        .column("timestamp")
        .map_err(map_err)?
        .datetime()
        .map_err(map_err)?;
    let opens = df.column("open").map_err(map_err)?.f64().map_err(map_err)?;
    let highs = df.column("high").map_err(map_err)?.f64().map_err(map_err)?;
    let lows = df.column("low").map_err(map_err)?.f64().map_err(map_err)?;
    let closes = df.column("close").map_err(map_err)?.f64().map_err(map_err)?;
    let vols = df.column("vol").map_err(map_err)?.f64().map_err(map_err)?;
    let openints = df
        .column("openint")
        .map_err(map_err)?
        .f64()
        .map_err(map_err)?;
    let formats = df.column("format").map_err(map_err)?.str().map_err(map_err)?;

    let n = df.height();
    let mut records = Vec::with_capacity(n);

    for i in 0..n {
        let ticker = tickers.get(i).ok_or_else(|| SchemaError::NullValue {
            column: "ticker".into(),
            row: i,
        })?;
        let ts_ms = timestamps.get(i).ok_or_else(|| SchemaError::NullValue {
            column: "timestamp".into(),
            row: i,
        })?;
        let timestamp = millis_to_naive(ts_ms).ok_or_else(|| SchemaError::NullValue {
            column: "timestamp".into(),
            row: i,
        })?;
        let close = closes.get(i).ok_or_else(|| SchemaError::NullValue {
            column: "close".into(),
            row: i,
        })?;

        records.push(CanonicalRecord {
            ticker: ticker.to_string(),
            timestamp,
            open: opens.get(i),
            high: highs.get(i),
            low: lows.get(i),
            close,
            vol: vols.get(i),
            openint: openints.get(i),
            format: formats.get(i).unwrap_or("").to_string(),
        });
    }

    Ok(records)
}

/// Convert typed records back into a canonical DataFrame.
pub fn records_to_frame(records: &[CanonicalRecord]) -> Result<DataFrame, SchemaError> {
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let timestamps: Vec<i64> = records
        .iter()
        .map(|r| r.timestamp.and_utc().timestamp_millis())
        .collect();
    let opens: Vec<Option<f64>> = records.iter().map(|r| r.open).collect();
    let highs: Vec<Option<f64>> = records.iter().map(|r| r.high).collect();
    let lows: Vec<Option<f64>> = records.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let vols: Vec<Option<f64>> = records.iter().map(|r| r.vol).collect();
    let openints: Vec<Option<f64>> = records.iter().map(|r| r.openint).collect();
    let formats: Vec<&str> = records.iter().map(|r| r.format.as_str()).collect();

    DataFrame::new(vec![
        Column::new("ticker".into(), tickers),
        Column::new("timestamp".into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| SchemaError::Frame(format!("timestamp cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("vol".into(), vols),
        Column::new("openint".into(), openints),
        Column::new("format".into(), formats),
    ])
    .map_err(|e| SchemaError::Frame(format!("frame creation: {e}")))
}

/// Millisecond epoch to UTC-naive datetime.
fn millis_to_naive(ms: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}
