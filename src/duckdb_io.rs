//! Shared Parquet I/O over DuckDB, used by ingestion, transformation,
//! validation, and load. Every query runs inside `spawn_blocking` behind a
//! semaphore so a bounded number of DuckDB connections are open at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use duckdb::Connection;
use tokio::sync::Semaphore;

use crate::model::{ProfileRow, RawReading, Reading};
use crate::security;
use crate::time;

/// A file row read without type coercion, for quality validation.
#[derive(Debug, Clone)]
pub struct QualityRow {
    pub sensor_id: Option<String>,
    pub reading_type: Option<String>,
    pub timestamp_raw: Option<String>,
    pub value_raw: Option<String>,
    pub battery_raw: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DuckDbIo {
    tmp_dir: PathBuf,
    semaphore: Arc<Semaphore>,
}

impl DuckDbIo {
    pub fn new(tmp_dir: PathBuf, max_concurrent: usize) -> Self {
        Self {
            tmp_dir,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    fn open_connection(tmp_dir: &Path) -> Result<Connection> {
        let conn = Connection::open_in_memory().context("failed to open in-memory duckdb")?;
        security::ensure_dir_mode(tmp_dir, 0o700).ok();
        let _ = conn.execute("PRAGMA threads=2", []);
        let _ = conn.execute("PRAGMA enable_progress_bar=false", []);
        let _ = conn.execute(
            &format!(
                "SET temp_directory='{}'",
                escape_single_quotes(tmp_dir.display().to_string())
            ),
            [],
        );
        Ok(conn)
    }

    /// Column names present in a Parquet file's schema, without reading any
    /// row groups (`LIMIT 0` keeps this a metadata-only operation).
    pub async fn schema_columns(&self, path: PathBuf) -> Result<Vec<String>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = Self::open_connection(&tmp_dir)?;
            let sql = format!(
                "DESCRIBE SELECT * FROM read_parquet('{}') LIMIT 0",
                escape_single_quotes(path.display().to_string())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                out.push(name);
            }
            Ok(out)
        })
        .await?
    }

    /// Reads every row of `path` as a [`RawReading`], tolerating nulls in
    /// any column and parsing `timestamp` permissively so an unparseable
    /// timestamp surfaces as `None` rather than an error, to be dropped by
    /// `DataCleaner`'s null-key check.
    pub async fn read_raw_readings(&self, path: PathBuf) -> Result<Vec<RawReading>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<RawReading>> {
            let conn = Self::open_connection(&tmp_dir)?;
            let sql = format!(
                "SELECT sensor_id, reading_type, CAST(timestamp AS VARCHAR), value, battery_level \
                 FROM read_parquet('{}')",
                escape_single_quotes(path.display().to_string())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let sensor_id: Option<String> = row.get(0)?;
                let reading_type: Option<String> = row.get(1)?;
                let timestamp: Option<String> = row.get(2)?;
                let value: Option<f64> = row.get(3)?;
                let battery_level: Option<f64> = row.get(4)?;
                out.push(RawReading {
                    sensor_id,
                    reading_type,
                    timestamp: timestamp.and_then(|raw| time::parse_permissive(&raw)),
                    value,
                    battery_level,
                });
            }
            Ok(out)
        })
        .await?
    }

    /// Reads every row of `path` as raw strings (no type coercion), for
    /// `DataQualityValidator`, which needs to detect columns holding
    /// values that don't coerce to the expected type rather than trusting
    /// the schema.
    pub async fn read_quality_rows(&self, path: PathBuf) -> Result<Vec<QualityRow>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<QualityRow>> {
            let conn = Self::open_connection(&tmp_dir)?;
            let sql = format!(
                "SELECT CAST(sensor_id AS VARCHAR), CAST(reading_type AS VARCHAR), \
                    CAST(timestamp AS VARCHAR), CAST(value AS VARCHAR), CAST(battery_level AS VARCHAR) \
                 FROM read_parquet('{}')",
                escape_single_quotes(path.display().to_string())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(QualityRow {
                    sensor_id: row.get(0)?,
                    reading_type: row.get(1)?,
                    timestamp_raw: row.get(2)?,
                    value_raw: row.get(3)?,
                    battery_raw: row.get(4)?,
                });
            }
            Ok(out)
        })
        .await?
    }

    /// Writes `rows` to `path` as a single-row-group Parquet file, Snappy
    /// compressed, creating parent directories as needed.
    pub async fn write_readings(&self, path: PathBuf, rows: Vec<Reading>) -> Result<()> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                security::ensure_dir_mode(parent, 0o750)?;
            }
            let conn = Self::open_connection(&tmp_dir)?;
            conn.execute(
                "CREATE TABLE readings (\
                    sensor_id VARCHAR, \
                    reading_type VARCHAR, \
                    timestamp TIMESTAMP, \
                    timestamp_ist VARCHAR, \
                    date VARCHAR, \
                    value DOUBLE, \
                    battery_level DOUBLE, \
                    daily_avg DOUBLE, \
                    rolling_7d_avg DOUBLE, \
                    anomalous_reading BOOLEAN\
                )",
                [],
            )?;

            {
                let mut appender = conn.appender("readings")?;
                for r in &rows {
                    appender.append_row(duckdb::params![
                        r.sensor_id,
                        r.reading_type,
                        r.timestamp.naive_utc(),
                        r.timestamp_ist,
                        r.date.to_string(),
                        r.value,
                        r.battery_level,
                        r.daily_avg,
                        r.rolling_7d_avg,
                        r.anomalous_reading,
                    ])?;
                }
                appender.flush()?;
            }

            conn.execute(
                &format!(
                    "COPY readings TO '{}' (FORMAT PARQUET, COMPRESSION SNAPPY)",
                    escape_single_quotes(path.display().to_string())
                ),
                [],
            )?;
            Ok(())
        })
        .await?
    }

    /// Copies `src` to `dest` unchanged (the ingested batch is written
    /// through without modification), re-encoding as Snappy-compressed
    /// Parquet.
    pub async fn copy_parquet(&self, src: PathBuf, dest: PathBuf) -> Result<()> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = dest.parent() {
                security::ensure_dir_mode(parent, 0o750)?;
            }
            let conn = Self::open_connection(&tmp_dir)?;
            conn.execute(
                &format!(
                    "COPY (SELECT * FROM read_parquet('{}')) TO '{}' (FORMAT PARQUET, COMPRESSION SNAPPY)",
                    escape_single_quotes(src.display().to_string()),
                    escape_single_quotes(dest.display().to_string())
                ),
                [],
            )?;
            Ok(())
        })
        .await?
    }

    /// Row count of a Parquet file, used by ingestion to populate the
    /// checkpoint's `rows` field without reading the whole batch into Rust.
    pub async fn row_count(&self, path: PathBuf) -> Result<i64> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<i64> {
            let conn = Self::open_connection(&tmp_dir)?;
            let sql = format!(
                "SELECT count(*) FROM read_parquet('{}')",
                escape_single_quotes(path.display().to_string())
            );
            conn.query_row(&sql, [], |row| row.get(0))
                .context("row count query failed")
        })
        .await?
    }

    /// `DataProfiler`: per-`reading_type` summary stats,
    /// rounded to 2 decimals, computed entirely in DuckDB.
    pub async fn profile(&self, path: PathBuf) -> Result<Vec<ProfileRow>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ProfileRow>> {
            let conn = Self::open_connection(&tmp_dir)?;
            let sql = format!(
                "SELECT reading_type, count(*), \
                    round(avg(value), 2), round(min(value), 2), round(max(value), 2), \
                    round(avg(battery_level), 2) \
                 FROM read_parquet('{}') GROUP BY reading_type ORDER BY reading_type",
                escape_single_quotes(path.display().to_string())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(ProfileRow {
                    reading_type: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    record_count: row.get(1)?,
                    avg_value: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    min_value: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    max_value: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    avg_battery: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                });
            }
            Ok(out)
        })
        .await?
    }

    /// Distinct `(date, sensor_id)` pairs present in a transformed file,
    /// used by `DataLoader` to enumerate target partitions. If `date` is
    /// absent from the schema, every row is assigned the literal
    /// `"unknown"` date.
    pub async fn partition_keys(&self, path: PathBuf, has_date: bool) -> Result<Vec<(String, String)>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<(String, String)>> {
            let conn = Self::open_connection(&tmp_dir)?;
            let date_expr = if has_date { "CAST(date AS VARCHAR)" } else { "'unknown'" };
            let sql = format!(
                "SELECT DISTINCT {date_expr}, sensor_id FROM read_parquet('{}') \
                 ORDER BY 1, 2",
                escape_single_quotes(path.display().to_string())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let date: Option<String> = row.get(0)?;
                let sensor_id: Option<String> = row.get(1)?;
                out.push((
                    date.unwrap_or_else(|| "unknown".to_string()),
                    sensor_id.unwrap_or_default(),
                ));
            }
            Ok(out)
        })
        .await?
    }

    /// Copies the rows of `path` belonging to a single `(date, sensor_id)`
    /// partition to `dest`, Snappy-compressed, one row group per call.
    pub async fn copy_partition_rows(
        &self,
        path: PathBuf,
        has_date: bool,
        date: String,
        sensor_id: String,
        dest: PathBuf,
    ) -> Result<()> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("duckdb concurrency gate closed")?;
        let tmp_dir = self.tmp_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = dest.parent() {
                security::ensure_dir_mode(parent, 0o750)?;
            }
            let conn = Self::open_connection(&tmp_dir)?;
            let date_filter = if has_date {
                format!(
                    " AND CAST(date AS VARCHAR) = '{}'",
                    escape_single_quotes(date.clone())
                )
            } else {
                String::new()
            };
            let sql = format!(
                "COPY (SELECT * FROM read_parquet('{}') WHERE sensor_id = '{}'{date_filter}) \
                 TO '{}' (FORMAT PARQUET, COMPRESSION SNAPPY)",
                escape_single_quotes(path.display().to_string()),
                escape_single_quotes(sensor_id),
                escape_single_quotes(dest.display().to_string()),
            );
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await?
    }
}

pub fn escape_single_quotes(input: String) -> String {
    input.replace('\'', "''")
}
