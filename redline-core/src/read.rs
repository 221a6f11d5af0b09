//! Boundary conversions: one reader per source format, each producing a
//! plain DataFrame with whatever columns the file happened to contain.
//!
//! Unparseable content is a `FormatError` here; deciding what to do about
//! it (skip the file, fail the run) is the engine's job.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::classify::FileFormat;
use crate::store::{StoreError, TickerStore, DEFAULT_TABLE};

/// Errors raised while turning file bytes into a table.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to open {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse {path} as {format}: {reason}")]
    Parse {
        path: String,
        format: FileFormat,
        reason: String,
    },

    #[error("normalization failed: {reason}")]
    Normalize { reason: String },

    #[error("store-backed input: {0}")]
    Store(#[from] StoreError),
}

/// Read a source file into a DataFrame according to its detected format.
pub fn read_table(path: &Path, format: FileFormat) -> Result<DataFrame, FormatError> {
    match format {
        FileFormat::Txt => read_stooq_txt(path),
        FileFormat::Csv => read_csv(path, b','),
        FileFormat::Json => read_json(path),
        FileFormat::Parquet => read_parquet(path),
        FileFormat::Feather => read_feather(path),
        FileFormat::Duckdb => read_duckdb(path),
    }
}

fn parse_err(path: &Path, format: FileFormat, e: impl std::fmt::Display) -> FormatError {
    FormatError::Parse {
        path: path.display().to_string(),
        format,
        reason: e.to_string(),
    }
}

fn open(path: &Path) -> Result<File, FormatError> {
    File::open(path).map_err(|e| FormatError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Stooq exports are delimited text: try tab first, and if that produces a
/// single column fall back to comma.
fn read_stooq_txt(path: &Path) -> Result<DataFrame, FormatError> {
    let df = read_csv(path, b'\t')?;
    if df.width() == 1 {
        return read_csv(path, b',');
    }
    Ok(df)
}

fn read_csv(path: &Path, separator: u8) -> Result<DataFrame, FormatError> {
    let format = if separator == b'\t' {
        FileFormat::Txt
    } else {
        FileFormat::Csv
    };
    CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| parse_err(path, format, e))?
        .finish()
        .map_err(|e| parse_err(path, format, e))
}

/// JSON inputs may be record-per-line or a single document; try lines first.
fn read_json(path: &Path) -> Result<DataFrame, FormatError> {
    let file = open(path)?;
    match JsonReader::new(file)
        .with_json_format(JsonFormat::JsonLines)
        .finish()
    {
        Ok(df) => Ok(df),
        Err(_) => {
            let file = open(path)?;
            JsonReader::new(file)
                .with_json_format(JsonFormat::Json)
                .finish()
                .map_err(|e| parse_err(path, FileFormat::Json, e))
        }
    }
}

fn read_parquet(path: &Path) -> Result<DataFrame, FormatError> {
    let file = open(path)?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| parse_err(path, FileFormat::Parquet, e))
}

fn read_feather(path: &Path) -> Result<DataFrame, FormatError> {
    let file = open(path)?;
    IpcReader::new(file)
        .finish()
        .map_err(|e| parse_err(path, FileFormat::Feather, e))
}

/// A DuckDB file produced by a previous run is a valid input: pull its
/// canonical table back into a frame.
fn read_duckdb(path: &Path) -> Result<DataFrame, FormatError> {
    let store = TickerStore::open(path)?;
    let records = store.read_records(DEFAULT_TABLE)?;
    crate::schema::records_to_frame(&records).map_err(|e| FormatError::Normalize {
        reason: e.to_string(),
    })
}
