//! Schema normalization: map an arbitrary input table onto the canonical
//! column set, fix types, and drop rows that fail the null invariant.
//!
//! Two related but distinct null-filtering policies exist in the wild for
//! Stooq data; both are kept as explicit configuration rather than unified.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classify::FileFormat;
use crate::read::FormatError;
use crate::schema::{CANONICAL_COLUMNS, NUMERIC_COLUMNS};

/// Exact parse format for combined Stooq date+time strings.
const STOOQ_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Which null pattern disqualifies a row from persistence.
///
/// Both policies also require non-null `ticker`: a canonical record cannot
/// exist without one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Drop rows with null `timestamp` or `close`.
    TimestampClose,
    /// Drop rows with null `timestamp` or any null among
    /// `open`, `high`, `low`, `close`. The conservative default.
    #[default]
    AllPrices,
}

/// Options threaded through normalization.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub policy: NullPolicy,
    /// Inclusive year bounds for Stooq timestamps. Rows outside the range
    /// (mis-keyed years, future dates) are discarded. `None` disables the
    /// check.
    pub year_range: Option<(i32, i32)>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        use chrono::Datelike;
        Self {
            policy: NullPolicy::default(),
            year_range: Some((1900, chrono::Utc::now().year())),
        }
    }
}

/// Normalize a raw table into canonical shape.
///
/// Stooq text gets the bracketed-header treatment; every other format goes
/// through the generic cleanup. The output has exactly the canonical
/// columns, in order, with the guaranteed-non-null invariant enforced.
pub fn normalize(
    df: DataFrame,
    format: FileFormat,
    opts: &NormalizeOptions,
) -> Result<DataFrame, FormatError> {
    match format {
        FileFormat::Txt => standardize_stooq(df, format, opts),
        _ => clean_generic(df, format, opts),
    }
}

/// Standardize a Stooq export: rename bracketed headers, combine DATE+TIME
/// into one timestamp, coerce numerics, project, filter.
pub fn standardize_stooq(
    mut df: DataFrame,
    format: FileFormat,
    opts: &NormalizeOptions,
) -> Result<DataFrame, FormatError> {
    // Map raw headers (possibly BOM-prefixed, bracketed, mixed-case) onto
    // working names. Unmapped columns keep their names and fall away at
    // projection.
    let renames: Vec<(String, &'static str)> = df
        .get_column_names()
        .iter()
        .filter_map(|name| stooq_column_target(name.as_str()).map(|target| (name.to_string(), target)))
        .collect();
    for (old, new) in renames {
        if old != new {
            df.rename(&old, new.into())
                .map_err(|e| normalize_err(format!("rename '{old}': {e}")))?;
        }
    }

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut lf = df.lazy();

    // Combine DATE + zero-padded TIME into a single exact-format timestamp.
    // Rows whose combined string fails to parse become null and are removed
    // by the policy filter below.
    if names.iter().any(|n| n == "date") && names.iter().any(|n| n == "time") {
        lf = lf.with_column(
            concat_str(
                [
                    col("date").cast(DataType::String),
                    col("time").cast(DataType::String).str().zfill(lit(6)),
                ],
                "",
                false,
            )
            .str()
            .to_datetime(
                Some(TimeUnit::Milliseconds),
                None,
                StrptimeOptions {
                    format: Some(STOOQ_TIMESTAMP_FORMAT.into()),
                    strict: false,
                    ..Default::default()
                },
                lit("raise"),
            )
            .alias("timestamp"),
        );
    }

    let df = lf
        .collect()
        .map_err(|e| normalize_err(format!("timestamp combine: {e}")))?;

    let mut predicate = base_predicate(opts.policy);
    if let Some((min_year, max_year)) = opts.year_range {
        predicate = predicate.and(
            col("timestamp")
                .dt()
                .year()
                .gt_eq(lit(min_year))
                .and(col("timestamp").dt().year().lt_eq(lit(max_year))),
        );
    }

    project_and_filter(df, format, predicate)
}

/// Generic cleanup for already-columnar formats: ensure every canonical
/// column exists, coerce types, project, filter.
pub fn clean_generic(
    df: DataFrame,
    format: FileFormat,
    opts: &NormalizeOptions,
) -> Result<DataFrame, FormatError> {
    project_and_filter(df, format, base_predicate(opts.policy))
}

fn normalize_err(reason: String) -> FormatError {
    FormatError::Normalize { reason }
}

fn base_predicate(policy: NullPolicy) -> Expr {
    let mut predicate = col("ticker")
        .is_not_null()
        .and(col("timestamp").is_not_null())
        .and(col("close").is_not_null());
    if policy == NullPolicy::AllPrices {
        predicate = predicate
            .and(col("open").is_not_null())
            .and(col("high").is_not_null())
            .and(col("low").is_not_null());
    }
    predicate
}

/// Project onto the canonical columns (absent → null, numerics coerced,
/// nested values nulled), stamp the format tag, then apply the row filter.
fn project_and_filter(
    df: DataFrame,
    format: FileFormat,
    predicate: Expr,
) -> Result<DataFrame, FormatError> {
    let schema = df.schema().clone();

    let exprs: Vec<Expr> = CANONICAL_COLUMNS
        .iter()
        .map(|&name| match name {
            "ticker" => ticker_expr(schema.get(name)),
            "timestamp" => timestamp_expr(schema.get(name)),
            "format" => lit(format.as_str()).alias("format"),
            _ => numeric_expr(schema.get(name), name),
        })
        .collect();

    df.lazy()
        .select(exprs)
        .filter(predicate)
        .collect()
        .map_err(|e| normalize_err(format!("projection: {e}")))
}

fn ticker_expr(dtype: Option<&DataType>) -> Expr {
    match dtype {
        None => lit(NULL).cast(DataType::String).alias("ticker"),
        Some(dt) if dt.is_nested() => lit(NULL).cast(DataType::String).alias("ticker"),
        Some(DataType::String) => col("ticker"),
        Some(_) => col("ticker").cast(DataType::String),
    }
}

/// Coerce whatever the source calls `timestamp` into Datetime(ms). Strings
/// are parsed non-strictly (garbage → null); anything nested is nulled.
fn timestamp_expr(dtype: Option<&DataType>) -> Expr {
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);
    match dtype {
        None => lit(NULL).cast(target).alias("timestamp"),
        Some(dt) if dt.is_nested() => lit(NULL).cast(target).alias("timestamp"),
        Some(DataType::String) => col("timestamp").str().to_datetime(
            Some(TimeUnit::Milliseconds),
            None,
            StrptimeOptions {
                strict: false,
                ..Default::default()
            },
            lit("raise"),
        ),
        Some(_) => col("timestamp").cast(target),
    }
}

/// Non-strict numeric coercion: unparseable cells become null; a column of
/// nested values (lists, structs) is nulled wholesale rather than raising.
fn numeric_expr(dtype: Option<&DataType>, name: &str) -> Expr {
    debug_assert!(NUMERIC_COLUMNS.contains(&name));
    match dtype {
        None => lit(NULL).cast(DataType::Float64).alias(name),
        Some(dt) if dt.is_nested() => lit(NULL).cast(DataType::Float64).alias(name),
        Some(DataType::Float64) => col(name),
        Some(_) => col(name).cast(DataType::Float64),
    }
}

fn stooq_column_target(raw: &str) -> Option<&'static str> {
    let cleaned = raw.trim_start_matches('\u{feff}').trim();
    let key = cleaned
        .trim_matches(|c| c == '<' || c == '>')
        .trim()
        .to_ascii_uppercase();
    match key.as_str() {
        "TICKER" => Some("ticker"),
        "PER" => Some("per"),
        "DATE" => Some("date"),
        "TIME" => Some("time"),
        "OPEN" => Some("open"),
        "HIGH" => Some("high"),
        "LOW" => Some("low"),
        "CLOSE" => Some("close"),
        "VOL" => Some("vol"),
        "OPENINT" => Some("openint"),
        _ => None,
    }
}
