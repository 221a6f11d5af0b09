//! Run reporting and table export — JSON summaries, CSV failure reports,
//! and writing the canonical table back out in any supported format.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use polars::prelude::*;

use redline_core::classify::FileFormat;
use redline_core::schema::records_to_frame;
use redline_core::store::{TickerStore, DEFAULT_TABLE};

use crate::engine::RunSummary;

// ─── Run summary artifacts ──────────────────────────────────────────

/// Serialize a run summary to pretty JSON.
pub fn summary_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize RunSummary to JSON")
}

/// Write the run summary JSON to a file.
pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = summary_json(summary)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write summary to {}", path.display()))
}

/// Export every per-file failure as CSV.
///
/// Columns: path, batch_index, reason
pub fn write_failures_csv(summary: &RunSummary, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    wtr.write_record(["path", "batch_index", "reason"])?;
    for failure in summary.failures() {
        wtr.write_record([
            &failure.path.display().to_string(),
            &failure.batch_index.to_string(),
            &failure.reason,
        ])?;
    }

    wtr.flush().context("failed to flush failure report")?;
    Ok(())
}

// ─── Table export ───────────────────────────────────────────────────

/// Write the canonical table back out in the requested format.
///
/// A `duckdb` target produces a fresh store whose `tickers_data` table holds
/// the rows; everything else goes through the corresponding polars writer.
pub fn export_table(
    store: &TickerStore,
    table: &str,
    path: &Path,
    format: FileFormat,
) -> Result<()> {
    let records = store
        .read_records(table)
        .with_context(|| format!("failed to read table '{table}'"))?;

    if format == FileFormat::Duckdb {
        let target = TickerStore::open(path)
            .with_context(|| format!("failed to open target store {}", path.display()))?;
        target
            .create_or_replace(DEFAULT_TABLE, &records)
            .context("failed to write target store")?;
        return Ok(());
    }

    let mut df = records_to_frame(&records).context("failed to build export frame")?;
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    match format {
        FileFormat::Csv => CsvWriter::new(file)
            .finish(&mut df)
            .context("failed to write CSV")?,
        FileFormat::Json => JsonWriter::new(file)
            .with_json_format(JsonFormat::JsonLines)
            .finish(&mut df)
            .context("failed to write JSON lines")?,
        FileFormat::Parquet => {
            ParquetWriter::new(file)
                .finish(&mut df)
                .context("failed to write Parquet")?;
        }
        FileFormat::Feather => IpcWriter::new(file)
            .finish(&mut df)
            .context("failed to write Feather")?,
        FileFormat::Txt => bail!("txt is an input-only format"),
        FileFormat::Duckdb => unreachable!("handled above"),
    }

    Ok(())
}
