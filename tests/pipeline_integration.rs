//! End-to-end stage-by-stage runs over a temp directory tree, covering
//! the happy path, quarantine on schema mismatch, hourly gap detection,
//! a missing timestamp column at load time, and resumability after a
//! partial ingest run.

use agri_pipeline::config::PipelineContext;
use agri_pipeline::duckdb_io::DuckDbIo;
use agri_pipeline::model::{Calibration, Reading, SensorConfig, SensorThresholds};
use agri_pipeline::{ingest, loader, quality, transform};
use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn sensor_config() -> SensorConfig {
    let mut reading_types = BTreeMap::new();
    reading_types.insert(
        "temperature".to_string(),
        SensorThresholds {
            min: Some(0.0),
            max: Some(50.0),
            calibration: Calibration {
                multiplier: 1.02,
                offset: 0.5,
            },
        },
    );
    reading_types.insert(
        "humidity".to_string(),
        SensorThresholds {
            min: Some(0.0),
            max: Some(100.0),
            calibration: Calibration {
                multiplier: 0.98,
                offset: 0.3,
            },
        },
    );
    SensorConfig { reading_types }
}

fn ctx(dir: &std::path::Path, config: SensorConfig) -> PipelineContext {
    PipelineContext {
        raw_dir: dir.join("raw"),
        processed_dir: dir.join("processed"),
        transformed_dir: dir.join("processed"),
        quarantine_dir: dir.join("quarantine"),
        analytics_dir: dir.join("analytics"),
        sensor_config_path: dir.join("config/sensor_config.json"),
        checkpoint_path: dir.join("state/checkpoints.json"),
        metadata_dir: dir.join("metadata"),
        sensor_config: config,
    }
}

/// S1 — happy path: clip + calibrate + load two sensors into distinct
/// partitions.
#[tokio::test]
async fn s1_happy_path_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let context = ctx(dir.path(), sensor_config());
    let io = DuckDbIo::new(dir.path().join("tmp"), 2);

    io.write_readings(
        context.raw_dir.join("day1.parquet"),
        vec![
            Reading {
                sensor_id: "s1".to_string(),
                reading_type: "temperature".to_string(),
                timestamp: Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap(),
                timestamp_ist: String::new(),
                date: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
                value: 25.0,
                battery_level: 90.0,
                daily_avg: 0.0,
                rolling_7d_avg: 0.0,
                anomalous_reading: false,
            },
            Reading {
                sensor_id: "s2".to_string(),
                reading_type: "humidity".to_string(),
                timestamp: Utc.with_ymd_and_hms(2025, 6, 5, 11, 0, 0).unwrap(),
                timestamp_ist: String::new(),
                date: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
                value: 999.0,
                battery_level: 85.0,
                daily_avg: 0.0,
                rolling_7d_avg: 0.0,
                anomalous_reading: false,
            },
        ],
    )
    .await?;

    let ingest_summary = ingest::run(&context, &io).await?;
    assert_eq!(ingest_summary.succeeded, 1);

    let transform_summary = transform::run(&context, &io).await?;
    assert_eq!(transform_summary.transformed, 1);

    let transformed_path = context.processed_dir.join("day1_transformed.parquet");
    let rows = io.read_raw_readings(transformed_path).await?;
    let temperature = rows
        .iter()
        .find(|r| r.reading_type.as_deref() == Some("temperature"))
        .unwrap();
    let humidity = rows
        .iter()
        .find(|r| r.reading_type.as_deref() == Some("humidity"))
        .unwrap();
    // humidity group size (1) < 5 clips to max=100 before calibration:
    // 100 * 0.98 + 0.3 = 98.3
    assert_eq!(humidity.value, Some(98.3));
    // temperature: 25.0 * 1.02 + 0.5 = 26.0
    assert_eq!(temperature.value, Some(26.0));

    let load_summary = loader::run(&context, &io).await?;
    assert_eq!(load_summary.partitions_written, 2);
    assert!(context
        .analytics_dir
        .join("date=2025-06-05")
        .join("sensor_id=s1")
        .exists());
    assert!(context
        .analytics_dir
        .join("date=2025-06-05")
        .join("sensor_id=s2")
        .exists());
    Ok(())
}

/// S2 — quarantine: a file missing `battery_level` never produces a
/// processed output and is recorded as quarantined.
#[tokio::test]
async fn s2_schema_mismatch_is_quarantined() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let context = ctx(dir.path(), sensor_config());
    let io = DuckDbIo::new(dir.path().join("tmp"), 2);

    std::fs::create_dir_all(&context.raw_dir)?;
    let conn = duckdb::Connection::open_in_memory()?;
    conn.execute(
        "CREATE TABLE t (sensor_id VARCHAR, timestamp TIMESTAMP, reading_type VARCHAR, value DOUBLE)",
        [],
    )?;
    conn.execute(
        &format!(
            "COPY t TO '{}' (FORMAT PARQUET)",
            context.raw_dir.join("bad.parquet").display()
        ),
        [],
    )?;

    let summary = ingest::run(&context, &io).await?;
    assert_eq!(summary.quarantined, 1);
    assert!(context.quarantine_dir.join("bad.parquet").exists());
    assert!(!context.processed_dir.join("bad_processed.parquet").exists());
    Ok(())
}

/// S3 — hourly gap: readings at 10:00, 11:00, 13:00 leave one missing hour.
#[tokio::test]
async fn s3_hourly_gap_is_detected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let context = ctx(dir.path(), sensor_config());
    let io = DuckDbIo::new(dir.path().join("tmp"), 2);

    let make = |hour: u32| Reading {
        sensor_id: "s1".to_string(),
        reading_type: "temperature".to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 6, 5, hour, 0, 0).unwrap(),
        timestamp_ist: String::new(),
        date: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
        value: 25.0,
        battery_level: 90.0,
        daily_avg: 25.0,
        rolling_7d_avg: 25.0,
        anomalous_reading: false,
    };

    io.write_readings(
        context.processed_dir.join("day1_transformed.parquet"),
        vec![make(10), make(11), make(13)],
    )
    .await?;

    let reports = quality::run(&context, &io).await?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].sensors_with_gaps, 1);
    assert_eq!(reports[0].total_missing_hours, 1);
    assert!(context.quality_report_path().exists());
    Ok(())
}

/// S4 — a transformed file lacking `timestamp`/`date` loads under
/// `date=unknown` rather than failing.
#[tokio::test]
async fn s4_missing_date_column_loads_under_unknown() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let context = ctx(dir.path(), sensor_config());
    let io = DuckDbIo::new(dir.path().join("tmp"), 2);

    std::fs::create_dir_all(&context.processed_dir)?;
    let conn = duckdb::Connection::open_in_memory()?;
    conn.execute(
        "CREATE TABLE t (sensor_id VARCHAR, reading_type VARCHAR, value DOUBLE)",
        [],
    )?;
    conn.execute("INSERT INTO t VALUES ('s1', 'temperature', 25.0)", [])?;
    conn.execute(
        &format!(
            "COPY t TO '{}' (FORMAT PARQUET)",
            context
                .processed_dir
                .join("notimestamp_transformed.parquet")
                .display()
        ),
        [],
    )?;

    let summary = loader::run(&context, &io).await?;
    assert_eq!(summary.partitions_written, 1);
    assert!(context
        .analytics_dir
        .join("date=unknown")
        .join("sensor_id=s1")
        .exists());
    Ok(())
}

/// S5 — resumability: re-running ingest after a partial prior run only
/// processes the files that haven't reached a terminal state.
#[tokio::test]
async fn s5_rerun_only_processes_remaining_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let context = ctx(dir.path(), sensor_config());
    let io = DuckDbIo::new(dir.path().join("tmp"), 2);

    for name in ["a.parquet", "b.parquet", "c.parquet"] {
        io.write_readings(
            context.raw_dir.join(name),
            vec![Reading {
                sensor_id: "s1".to_string(),
                reading_type: "temperature".to_string(),
                timestamp: Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap(),
                timestamp_ist: String::new(),
                date: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
                value: 25.0,
                battery_level: 90.0,
                daily_avg: 0.0,
                rolling_7d_avg: 0.0,
                anomalous_reading: false,
            }],
        )
        .await?;
    }

    let first = ingest::run(&context, &io).await?;
    assert_eq!(first.succeeded, 3);

    // Drop a new file in, simulating the remaining unprocessed input of a
    // kill-and-resume scenario.
    io.write_readings(
        context.raw_dir.join("d.parquet"),
        vec![Reading {
            sensor_id: "s1".to_string(),
            reading_type: "temperature".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 5, 11, 0, 0).unwrap(),
            timestamp_ist: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
            value: 25.0,
            battery_level: 90.0,
            daily_avg: 0.0,
            rolling_7d_avg: 0.0,
            anomalous_reading: false,
        }],
    )
    .await?;

    let second = ingest::run(&context, &io).await?;
    assert_eq!(second.succeeded, 1);
    Ok(())
}
