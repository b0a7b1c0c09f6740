//! `SchemaValidator`: cheaply inspects a file's columns
//! without reading row groups.

use std::path::PathBuf;

use anyhow::Result;

use crate::duckdb_io::DuckDbIo;

pub const REQUIRED_COLUMNS: [&str; 5] =
    ["sensor_id", "timestamp", "reading_type", "value", "battery_level"];

#[derive(Debug, Clone)]
pub struct SchemaValidation {
    pub ok: bool,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

/// Validates `path`'s schema against [`REQUIRED_COLUMNS`]. `missing`
/// nonempty implies `ok = false`; `extra` columns are reported but never
/// fail validation.
pub async fn validate(io: &DuckDbIo, path: PathBuf) -> Result<SchemaValidation> {
    let columns = io.schema_columns(path).await?;
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c == *required))
        .map(|s| s.to_string())
        .collect();
    let extra: Vec<String> = columns
        .iter()
        .filter(|c| !REQUIRED_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect();
    Ok(SchemaValidation {
        ok: missing.is_empty(),
        missing,
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reading;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[tokio::test]
    async fn valid_file_has_no_missing_columns() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let io = DuckDbIo::new(dir.path().join("tmp"), 2);
        let path = dir.path().join("a.parquet");
        io.write_readings(
            path.clone(),
            vec![Reading {
                sensor_id: "s1".to_string(),
                reading_type: "temperature".to_string(),
                timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                timestamp_ist: "2025-01-01T05:30:00".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                value: 1.0,
                battery_level: 90.0,
                daily_avg: 1.0,
                rolling_7d_avg: 1.0,
                anomalous_reading: false,
            }],
        )
        .await?;

        let result = validate(&io, path).await?;
        assert!(result.ok);
        assert!(result.missing.is_empty());
        assert!(result.extra.contains(&"timestamp_ist".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn missing_battery_level_fails_validation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let io = DuckDbIo::new(dir.path().join("tmp"), 2);
        let path = dir.path().join("bad.parquet");
        let tmp = dir.path().join("tmp2");
        std::fs::create_dir_all(&tmp)?;
        let conn = duckdb::Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE t (sensor_id VARCHAR, timestamp TIMESTAMP, reading_type VARCHAR, value DOUBLE)",
            [],
        )?;
        conn.execute(
            &format!(
                "COPY t TO '{}' (FORMAT PARQUET)",
                path.display()
            ),
            [],
        )?;

        let result = validate(&io, path).await?;
        assert!(!result.ok);
        assert_eq!(result.missing, vec!["battery_level".to_string()]);
        Ok(())
    }
}
