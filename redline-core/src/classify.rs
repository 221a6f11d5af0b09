//! File classification: extension-based format detection plus a one-line
//! header probe that decides whether a `.txt` file is a Stooq export.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bracketed header tokens a Stooq export must carry.
pub const REQUIRED_STOOQ_TOKENS: [&str; 8] = [
    "<TICKER>", "<DATE>", "<TIME>", "<OPEN>", "<HIGH>", "<LOW>", "<CLOSE>", "<VOL>",
];

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Txt,
    Csv,
    Json,
    Parquet,
    Feather,
    Duckdb,
}

impl FileFormat {
    /// Look up a format from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "parquet" => Some(Self::Parquet),
            "feather" => Some(Self::Feather),
            "duckdb" => Some(Self::Duckdb),
            _ => None,
        }
    }

    /// Tag written into the canonical `format` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Parquet => "parquet",
            Self::Feather => "feather",
            Self::Duckdb => "duckdb",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one input file, produced once and consumed by
/// the batch planner and the ingestion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub format: FileFormat,
    pub size_bytes: u64,
}

/// Errors from classification. All of these are per-file and recoverable:
/// the engine records them and moves on.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no recognized extension: {path}")]
    UnknownExtension { path: String },

    #[error("not a valid Stooq header: {path}")]
    NotStooq { path: String },

    #[error("unreadable file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Classify a file by extension. For `.txt` files, optionally validate the
/// Stooq header (a single-line probe) before accepting the file.
pub fn classify(path: &Path, validate_stooq_header: bool) -> Result<FileDescriptor, ClassifyError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ClassifyError::UnknownExtension {
            path: path.display().to_string(),
        })?;

    let format = FileFormat::from_extension(ext).ok_or_else(|| ClassifyError::UnknownExtension {
        path: path.display().to_string(),
    })?;

    if format == FileFormat::Txt && validate_stooq_header && !is_valid_stooq(path) {
        return Err(ClassifyError::NotStooq {
            path: path.display().to_string(),
        });
    }

    let size_bytes = std::fs::metadata(path)
        .map_err(|e| ClassifyError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .len();

    Ok(FileDescriptor {
        path: path.to_path_buf(),
        format,
        size_bytes,
    })
}

/// Check whether a file looks like a Stooq export.
///
/// Reads only the header line. True iff its delimited tokens (comma- or
/// tab-separated) are a superset of the required bracketed set. Any I/O or
/// decode failure yields false, never an error.
pub fn is_valid_stooq(path: &Path) -> bool {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut header = String::new();
    if BufReader::new(file).read_line(&mut header).is_err() {
        return false;
    }

    let header = header.trim();
    let delimiter = if header.contains('\t') { '\t' } else { ',' };
    let tokens: Vec<&str> = header.split(delimiter).map(str::trim).collect();

    REQUIRED_STOOQ_TOKENS
        .iter()
        .all(|required| tokens.contains(required))
}
