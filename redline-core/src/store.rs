//! Persistent store adapter: one DuckDB file, one canonical table.
//!
//! The adapter is the only component that mutates the table. The engine
//! calls `create_or_replace` on a run's first successful batch and `append`
//! for every batch after; everything else here is read-only introspection
//! for downstream viewers.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use duckdb::types::Value;
use duckdb::Connection;
use thiserror::Error;

use crate::schema::CanonicalRecord;

/// Name of the canonical table in every store this pipeline produces.
pub const DEFAULT_TABLE: &str = "tickers_data";

const CANONICAL_SELECT: &str =
    "SELECT ticker, timestamp, open, high, low, close, vol, openint, format";

/// Store failures. Always fatal for the current run: continuing past a
/// failed write would leave the table inconsistent with reported progress.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duckdb: {0}")]
    Database(#[from] duckdb::Error),

    #[error("failed to open store at {path}: {reason}")]
    Open { path: String, reason: String },
}

/// Column names/types plus row count, for downstream viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub columns: Vec<(String, String)>,
    pub row_count: usize,
}

/// Embedded analytical store holding the canonical table.
pub struct TickerStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl TickerStore {
    /// Open (or create) a store file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory store. Data is gone when the value drops; used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".into(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// On-disk location, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drop any existing table of this name, create it with the fixed
    /// canonical schema, and bulk-load `records` in one transaction.
    pub fn create_or_replace(
        &self,
        table: &str,
        records: &[CanonicalRecord],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                 ticker VARCHAR NOT NULL,
                 timestamp TIMESTAMP NOT NULL,
                 open DOUBLE,
                 high DOUBLE,
                 low DOUBLE,
                 close DOUBLE NOT NULL,
                 vol DOUBLE,
                 openint DOUBLE,
                 format VARCHAR
             );"
        ))?;

        insert_records(&tx, table, records)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert `records` into the existing table without touching its schema.
    pub fn append(&self, table: &str, records: &[CanonicalRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        insert_records(&tx, table, records)?;
        tx.commit()?;
        Ok(())
    }

    /// Column layout and row count of a table.
    pub fn describe(&self, table: &str) -> Result<TableInfo, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!("DESCRIBE {table}"))?;
        let columns = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let row_count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;

        Ok(TableInfo {
            columns,
            row_count: row_count as usize,
        })
    }

    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    /// All rows in physical insertion order.
    pub fn read_records(&self, table: &str) -> Result<Vec<CanonicalRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{CANONICAL_SELECT} FROM {table}"))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// A page of rows for viewers that scroll a large table.
    pub fn fetch_page(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CanonicalRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{CANONICAL_SELECT} FROM {table} LIMIT {limit} OFFSET {offset}"
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Read-only SQL passthrough for downstream consumers. Returns
    /// dynamically typed rows; the caller renders them.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<Vec<Value>>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Value>(i)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Deterministic BLAKE3 fingerprint over all rows in insertion order.
    ///
    /// Two runs over the same inputs into fresh stores produce the same
    /// fingerprint, which is how the idempotence tests check "byte-for-byte
    /// identical row sets".
    pub fn fingerprint(&self, table: &str) -> Result<String, StoreError> {
        let records = self.read_records(table)?;
        let mut hasher = blake3::Hasher::new();
        for r in &records {
            hasher.update(r.ticker.as_bytes());
            hasher.update(&r.timestamp.and_utc().timestamp_millis().to_le_bytes());
            for value in [r.open, r.high, r.low, Some(r.close), r.vol, r.openint] {
                match value {
                    Some(v) => hasher.update(&v.to_le_bytes()),
                    None => hasher.update(&[0xffu8]),
                };
            }
            hasher.update(r.format.as_bytes());
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

fn insert_records(
    tx: &duckdb::Transaction<'_>,
    table: &str,
    records: &[CanonicalRecord],
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {table} (ticker, timestamp, open, high, low, close, vol, openint, format)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))?;

    for r in records {
        stmt.execute(duckdb::params![
            r.ticker,
            r.timestamp,
            r.open,
            r.high,
            r.low,
            r.close,
            r.vol,
            r.openint,
            r.format,
        ])?;
    }

    Ok(())
}

fn row_to_record(row: &duckdb::Row<'_>) -> Result<CanonicalRecord, duckdb::Error> {
    Ok(CanonicalRecord {
        ticker: row.get(0)?,
        timestamp: row.get(1)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        vol: row.get(6)?,
        openint: row.get(7)?,
        format: row.get(8)?,
    })
}
