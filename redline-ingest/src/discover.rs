//! Input discovery: recursive Stooq file search and up-front classification
//! of an arbitrary path list.
//!
//! Classification happens before batching, so files that can never ingest
//! (unknown extension, bad Stooq header) reduce the considered total rather
//! than burning a per-batch error later.

use redline_core::classify::{classify, is_valid_stooq, FileDescriptor, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::IngestConfig;

/// A path rejected during classification, with the reason preserved for the
/// run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of classifying a path list.
#[derive(Debug, Default)]
pub struct Classified {
    pub files: Vec<FileDescriptor>,
    pub skipped: Vec<SkippedFile>,
}

/// Recursively collect `.txt` files under `dir` whose header passes the
/// Stooq probe. Unreadable directories and files are skipped silently; the
/// result is sorted for deterministic batch plans.
pub fn find_stooq_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk_txt_files(dir, &mut found);
    found.retain(|path| is_valid_stooq(path));
    found.sort();
    found
}

fn walk_txt_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("skipping unreadable directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_txt_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("txt") {
            out.push(path);
        }
    }
}

/// Classify every path, honoring a declared input format when the
/// configuration carries one. Rejected paths land in `skipped` with their
/// reasons; accepted ones become immutable descriptors for the planner.
pub fn classify_paths(paths: &[PathBuf], config: &IngestConfig) -> Classified {
    let mut classified = Classified::default();

    for path in paths {
        let outcome = match config.input_format {
            Some(format) => describe_declared(path, format, config.validate_stooq_header),
            None => classify(path, config.validate_stooq_header).map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(fd) => classified.files.push(fd),
            Err(reason) => {
                log::warn!("excluding {}: {reason}", path.display());
                classified.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }

    classified
}

/// Build a descriptor for a path whose format the caller declared up front.
/// Stooq validation still applies to declared-txt inputs.
fn describe_declared(
    path: &Path,
    format: FileFormat,
    validate_stooq_header: bool,
) -> Result<FileDescriptor, String> {
    if format == FileFormat::Txt && validate_stooq_header && !is_valid_stooq(path) {
        return Err(format!("not a valid Stooq header: {}", path.display()));
    }
    let size_bytes = std::fs::metadata(path)
        .map_err(|e| format!("unreadable file {}: {e}", path.display()))?
        .len();
    Ok(FileDescriptor {
        path: path.to_path_buf(),
        format,
        size_bytes,
    })
}
