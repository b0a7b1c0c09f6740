//! `DataQualityValidator`: one [`QualityReport`] row per
//! transformed file, with typed/range/completeness checks and hourly-gap
//! detection. Assembled entirely in memory and written once, atomically.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};

use crate::config::PipelineContext;
use crate::duckdb_io::{DuckDbIo, QualityRow};
use crate::model::{QualityReport, SensorConfig};
use crate::security;
use crate::time;

pub async fn run(ctx: &PipelineContext, io: &DuckDbIo) -> Result<Vec<QualityReport>> {
    let mut reports = Vec::new();
    for path in list_transformed_files(&ctx.transformed_dir)? {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let report = match io.read_quality_rows(path.clone()).await {
            Ok(rows) => validate_file(&file_name, &rows, &ctx.sensor_config),
            Err(err) => {
                tracing::error!(file = file_name, error = %err, "failed to read transformed file for quality validation");
                QualityReport::failed(file_name)
            }
        };
        reports.push(report);
    }

    write_report(&ctx.quality_report_path(), &reports)?;
    Ok(reports)
}

fn validate_file(file_name: &str, rows: &[QualityRow], config: &SensorConfig) -> QualityReport {
    let total_records = rows.len() as i64;

    let mut invalid_value_type = 0i64;
    let mut invalid_timestamp = 0i64;

    let mut per_type_total: BTreeMap<String, i64> = BTreeMap::new();
    let mut per_type_outliers: BTreeMap<String, i64> = BTreeMap::new();
    let mut per_type_missing: BTreeMap<String, i64> = BTreeMap::new();

    let mut sensor_timestamps: BTreeMap<String, BTreeSet<DateTime<Utc>>> = BTreeMap::new();

    for row in rows {
        let reading_type = row.reading_type.clone().unwrap_or_default();
        *per_type_total.entry(reading_type.clone()).or_insert(0) += 1;

        let parsed_value = row.value_raw.as_deref().and_then(|s| s.parse::<f64>().ok());
        if row.value_raw.is_none() {
            *per_type_missing.entry(reading_type.clone()).or_insert(0) += 1;
        } else if parsed_value.is_none() {
            invalid_value_type += 1;
        }

        if let Some(value) = parsed_value {
            let thresholds = config.thresholds_for(&reading_type);
            if thresholds.is_out_of_range(value) {
                *per_type_outliers.entry(reading_type.clone()).or_insert(0) += 1;
            }
        }

        let parsed_ts = row
            .timestamp_raw
            .as_deref()
            .and_then(time::parse_permissive);
        match (parsed_ts, &row.sensor_id) {
            (None, _) => invalid_timestamp += 1,
            (Some(ts), Some(sensor_id)) => {
                sensor_timestamps
                    .entry(sensor_id.clone())
                    .or_default()
                    .insert(truncate_to_hour(ts));
            }
            (Some(_), None) => {}
        }
    }

    let outlier_pct = per_type_total
        .iter()
        .map(|(rt, total)| {
            let outliers = per_type_outliers.get(rt).copied().unwrap_or(0);
            (rt.clone(), round2(100.0 * outliers as f64 / *total as f64))
        })
        .collect::<BTreeMap<_, _>>();

    let missing_pct = per_type_total
        .iter()
        .map(|(rt, total)| {
            let missing = per_type_missing.get(rt).copied().unwrap_or(0);
            (rt.clone(), round2(100.0 * missing as f64 / *total as f64))
        })
        .collect::<BTreeMap<_, _>>();

    let (sensors_with_gaps, total_missing_hours) = detect_gaps(&sensor_timestamps);

    QualityReport {
        file_name: file_name.to_string(),
        total_records,
        invalid_value_type,
        invalid_timestamp,
        outlier_pct: serde_json::to_string(&outlier_pct).unwrap_or_else(|_| "{}".to_string()),
        missing_pct: serde_json::to_string(&missing_pct).unwrap_or_else(|_| "{}".to_string()),
        sensors_with_gaps,
        total_missing_hours,
    }
}

fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt - chrono::Duration::minutes(dt.minute() as i64) - chrono::Duration::seconds(dt.second() as i64)
}

/// Streaming two-pointer gap count over each sensor's sorted, deduplicated,
/// hour-truncated actual timestamps: walks consecutive pairs and sums the hour-buckets strictly
/// between them, without materializing the full expected-hour series.
fn detect_gaps(sensor_timestamps: &BTreeMap<String, BTreeSet<DateTime<Utc>>>) -> (i64, i64) {
    let mut sensors_with_gaps = 0i64;
    let mut total_missing_hours = 0i64;

    for hours in sensor_timestamps.values() {
        if hours.len() < 2 {
            continue;
        }
        let mut missing_for_sensor = 0i64;
        let mut prev: Option<DateTime<Utc>> = None;
        for &hour in hours {
            if let Some(prev_hour) = prev {
                let gap_hours = (hour - prev_hour).num_hours() - 1;
                if gap_hours > 0 {
                    missing_for_sensor += gap_hours;
                }
            }
            prev = Some(hour);
        }
        if missing_for_sensor > 0 {
            sensors_with_gaps += 1;
            total_missing_hours += missing_for_sensor;
        }
    }

    (sensors_with_gaps, total_missing_hours)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn list_transformed_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(Vec::new());
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.ends_with("_transformed"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_report(path: &Path, reports: &[QualityReport]) -> Result<()> {
    if let Some(parent) = path.parent() {
        security::ensure_dir_mode(parent, 0o750)?;
    }
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new().from_writer(&mut buf);
        writer.write_record([
            "file_name",
            "total_records",
            "invalid_value_type",
            "invalid_timestamp",
            "outlier_%",
            "missing_%",
            "sensors_with_gaps",
            "total_missing_hours",
        ])?;
        for report in reports {
            writer.write_record([
                report.file_name.as_str(),
                &report.total_records.to_string(),
                &report.invalid_value_type.to_string(),
                &report.invalid_timestamp.to_string(),
                report.outlier_pct.as_str(),
                report.missing_pct.as_str(),
                &report.sensors_with_gaps.to_string(),
                &report.total_missing_hours.to_string(),
            ])?;
        }
        writer.flush()?;
    }
    security::atomic_write_bytes(path, &buf)
}
