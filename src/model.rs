use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A row as read from an ingested input file, before cleaning. Fields the
/// cleaner is responsible for repairing or dropping are `Option` here;
/// after `DataCleaner` runs they become required scalars on [`CleanReading`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReading {
    pub sensor_id: Option<String>,
    pub reading_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub value: Option<f64>,
    pub battery_level: Option<f64>,
}

/// A reading after `DataCleaner` has deduplicated, dropped null keys,
/// imputed missing numerics, and corrected outliers. The primary key
/// (`sensor_id`, `timestamp`, `reading_type`) and both numeric columns are
/// guaranteed non-null from here on, and stay that way through calibration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanReading {
    pub sensor_id: String,
    pub reading_type: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub battery_level: f64,
}

/// A fully transformed reading: calibrated, timestamp-canonicalized, and
/// feature-enriched. This is the row shape written to `*_transformed` files
/// and consumed by validation and load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    pub reading_type: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_ist: String,
    pub date: NaiveDate,
    pub value: f64,
    pub battery_level: f64,
    pub daily_avg: f64,
    pub rolling_7d_avg: f64,
    pub anomalous_reading: bool,
}

/// Per-reading-type calibration: `corrected = raw * multiplier + offset`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "Calibration::default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
}

impl Calibration {
    fn default_multiplier() -> f64 {
        1.0
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            multiplier: Self::default_multiplier(),
            offset: 0.0,
        }
    }
}

/// Valid range and calibration for one `reading_type`. Keys not present in a
/// loaded [`SensorConfig`] fall back to `SensorThresholds::default()` (no
/// range check, identity calibration) — an unknown reading type is neutral,
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorThresholds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default)]
    pub calibration: Calibration,
}

impl Default for SensorThresholds {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            calibration: Calibration::default(),
        }
    }
}

impl SensorThresholds {
    /// `true` iff `value` falls outside `[min, max]`. A bound left
    /// unconfigured never flags on that side; a type with neither bound set
    /// (the "unknown to config" case) never flags at all.
    pub fn is_out_of_range(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return true;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return true;
            }
        }
        false
    }
}

/// Calibration and range thresholds keyed by `reading_type`, loaded once
/// from `config/sensor_config.json` and treated as immutable for the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(flatten)]
    pub reading_types: BTreeMap<String, SensorThresholds>,
}

impl SensorConfig {
    /// Thresholds for `reading_type`, or a neutral default (no range check,
    /// identity calibration) if the type is absent from the loaded config.
    pub fn thresholds_for(&self, reading_type: &str) -> SensorThresholds {
        self.reading_types
            .get(reading_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Persisted per-file checkpoint entry. `processed_at` is the moment the
/// file reached a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub checksum: String,
    pub rows: usize,
    pub status: CheckpointStatus,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Success,
    Quarantined,
    Failed,
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckpointStatus::Success => "success",
            CheckpointStatus::Quarantined => "quarantined",
            CheckpointStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Append-only ingestion attempt record, one row per file per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionLogEntry {
    pub filename: String,
    pub rows: usize,
    pub status: CheckpointStatus,
    pub error: String,
    pub duration_sec: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-reading-type summary produced by `DataProfiler`, used only for
/// logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRow {
    pub reading_type: String,
    pub record_count: i64,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_battery: f64,
}

/// One row of `metadata/data_quality_report.csv`, emitted per transformed
/// file. `outlier_pct`/`missing_pct` are JSON-encoded `reading_type -> f64`
/// maps so the report stays single-row-per-file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub file_name: String,
    pub total_records: i64,
    pub invalid_value_type: i64,
    pub invalid_timestamp: i64,
    pub outlier_pct: String,
    pub missing_pct: String,
    pub sensors_with_gaps: i64,
    pub total_missing_hours: i64,
}

impl QualityReport {
    /// A report row for a file whose validation failed outright: numeric
    /// fields are set to the sentinel `-1`.
    pub fn failed(file_name: String) -> Self {
        Self {
            file_name,
            total_records: -1,
            invalid_value_type: -1,
            invalid_timestamp: -1,
            outlier_pct: "{}".to_string(),
            missing_pct: "{}".to_string(),
            sensors_with_gaps: -1,
            total_missing_hours: -1,
        }
    }
}
