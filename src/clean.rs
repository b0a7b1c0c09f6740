//! `DataCleaner`: deduplicates, drops null keys, imputes
//! missing numerics, and corrects outliers, in that order.

use std::collections::{BTreeMap, HashSet};

use crate::model::{CleanReading, RawReading, SensorConfig};

/// Runs the four cleaning steps over `rows` in spec order. `config` is
/// consulted only by the small-group clip branch of outlier correction.
pub fn clean(rows: Vec<RawReading>, config: &SensorConfig) -> Vec<CleanReading> {
    let rows = drop_duplicate_keys(rows);
    let rows = drop_null_keys(rows);
    let rows = impute_numeric_columns(rows);
    correct_outliers(rows, config)
}

/// Step 1: drop exact duplicates on (sensor_id, timestamp, reading_type),
/// first occurrence wins. Keys are only ever compared among rows that
/// already have all three non-null; rows missing a key component are left
/// for step 2 to drop.
fn drop_duplicate_keys(rows: Vec<RawReading>) -> Vec<RawReading> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match (&row.sensor_id, &row.timestamp, &row.reading_type) {
            (Some(s), Some(t), Some(r)) => {
                let key = (s.clone(), *t, r.clone());
                if seen.insert(key) {
                    out.push(row);
                }
            }
            _ => out.push(row),
        }
    }
    out
}

/// Step 2: drop rows where sensor_id, timestamp, or reading_type is
/// null/empty.
fn drop_null_keys(rows: Vec<RawReading>) -> Vec<RawReading> {
    rows.into_iter()
        .filter(|row| {
            let sensor_ok = row.sensor_id.as_deref().is_some_and(|s| !s.is_empty());
            let type_ok = row.reading_type.as_deref().is_some_and(|s| !s.is_empty());
            let ts_ok = row.timestamp.is_some();
            sensor_ok && type_ok && ts_ok
        })
        .collect()
}

/// Step 3: impute `value`/`battery_level` nulls with the column's
/// arithmetic mean over the surviving rows (computed before any
/// replacement). If a column is entirely null, imputation is infeasible —
/// this surfaces to the caller as an empty-mean marker; callers quarantine
/// such files upstream rather than silently filling `NaN`.
fn impute_numeric_columns(rows: Vec<RawReading>) -> Vec<RawReading> {
    let value_mean = column_mean(rows.iter().filter_map(|r| r.value));
    let battery_mean = column_mean(rows.iter().filter_map(|r| r.battery_level));

    rows.into_iter()
        .map(|mut row| {
            if row.value.is_none() {
                row.value = value_mean;
            }
            if row.battery_level.is_none() {
                row.battery_level = battery_mean;
            }
            row
        })
        .collect()
}

fn column_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Step 4: per-`reading_type` group outlier correction. Groups of size >= 5
/// use a z-score flag against the population mean/stddev (ddof = 0),
/// replacing flagged values with the pre-replacement group median. Smaller
/// groups are clipped to the configured `[min, max]`. Rows that still carry
/// a null `value`/`battery_level` after imputation (all-null column) are
/// dropped here rather than treated as a group member.
fn correct_outliers(rows: Vec<RawReading>, config: &SensorConfig) -> Vec<CleanReading> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut clean_rows: Vec<Option<CleanReading>> = Vec::with_capacity(rows.len());

    for row in rows {
        let (sensor_id, reading_type, timestamp, value, battery_level) = (
            row.sensor_id,
            row.reading_type,
            row.timestamp,
            row.value,
            row.battery_level,
        );
        match (sensor_id, reading_type, timestamp, value, battery_level) {
            (Some(sensor_id), Some(reading_type), Some(timestamp), Some(value), Some(battery_level)) => {
                let idx = clean_rows.len();
                groups.entry(reading_type.clone()).or_default().push(idx);
                clean_rows.push(Some(CleanReading {
                    sensor_id,
                    reading_type,
                    timestamp,
                    value,
                    battery_level,
                }));
            }
            _ => clean_rows.push(None),
        }
    }

    for (reading_type, indices) in groups {
        let values: Vec<f64> = indices
            .iter()
            .map(|&i| clean_rows[i].as_ref().unwrap().value)
            .collect();

        if values.len() >= 5 {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
            let stddev = variance.sqrt();
            if stddev > 0.0 {
                let median = median_of(&values);
                for &idx in &indices {
                    let row = clean_rows[idx].as_mut().unwrap();
                    if ((row.value - mean) / stddev).abs() > 3.0 {
                        row.value = median;
                    }
                }
            }
        } else {
            let thresholds = config.thresholds_for(&reading_type);
            for &idx in &indices {
                let row = clean_rows[idx].as_mut().unwrap();
                if let Some(min) = thresholds.min {
                    row.value = row.value.max(min);
                }
                if let Some(max) = thresholds.max {
                    row.value = row.value.min(max);
                }
            }
        }
    }

    clean_rows.into_iter().flatten().collect()
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SensorThresholds;
    use chrono::{TimeZone, Utc};

    fn raw(sensor: &str, ts_secs: i64, rt: &str, value: Option<f64>, battery: Option<f64>) -> RawReading {
        RawReading {
            sensor_id: Some(sensor.to_string()),
            reading_type: Some(rt.to_string()),
            timestamp: Some(Utc.timestamp_opt(ts_secs, 0).unwrap()),
            value,
            battery_level: battery,
        }
    }

    #[test]
    fn drops_exact_duplicate_keys_keeping_first() {
        let rows = vec![
            raw("s1", 0, "temperature", Some(1.0), Some(90.0)),
            raw("s1", 0, "temperature", Some(99.0), Some(10.0)),
        ];
        let out = drop_duplicate_keys(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, Some(1.0));
    }

    #[test]
    fn drops_rows_with_null_or_empty_keys() {
        let mut missing_sensor = raw("s1", 0, "temperature", Some(1.0), Some(1.0));
        missing_sensor.sensor_id = None;
        let mut empty_type = raw("s1", 1, "temperature", Some(1.0), Some(1.0));
        empty_type.reading_type = Some(String::new());
        let ok = raw("s1", 2, "temperature", Some(1.0), Some(1.0));

        let out = drop_null_keys(vec![missing_sensor, empty_type, ok]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn imputes_missing_numerics_with_column_mean() {
        let rows = vec![
            raw("s1", 0, "temperature", Some(10.0), Some(50.0)),
            raw("s1", 1, "temperature", Some(20.0), None),
            raw("s1", 2, "temperature", None, Some(70.0)),
        ];
        let out = impute_numeric_columns(rows);
        assert_eq!(out[1].battery_level, Some(60.0));
        assert_eq!(out[2].value, Some(15.0));
    }

    #[test]
    fn small_group_clips_to_config_range() {
        let rows = vec![raw("s1", 0, "humidity", Some(999.0), Some(85.0))];
        let mut config = SensorConfig::default();
        config.reading_types.insert(
            "humidity".to_string(),
            SensorThresholds {
                min: Some(0.0),
                max: Some(100.0),
                calibration: Default::default(),
            },
        );
        let out = correct_outliers(rows, &config);
        assert_eq!(out[0].value, 100.0);
    }

    #[test]
    fn large_group_flags_zscore_outlier_and_replaces_with_median() {
        let values = [10.0, 10.0, 10.0, 10.0, 100.0];
        let rows: Vec<RawReading> = values
            .iter()
            .enumerate()
            .map(|(i, v)| raw("s1", i as i64, "temperature", Some(*v), Some(90.0)))
            .collect();
        let out = correct_outliers(rows, &SensorConfig::default());
        // median of [10,10,10,10,100] is 10.0
        assert_eq!(out[4].value, 10.0);
        assert_eq!(out[0].value, 10.0);
    }

    #[test]
    fn zero_stddev_group_flags_nothing() {
        let rows: Vec<RawReading> = (0..5)
            .map(|i| raw("s1", i, "temperature", Some(42.0), Some(90.0)))
            .collect();
        let out = correct_outliers(rows, &SensorConfig::default());
        assert!(out.iter().all(|r| r.value == 42.0));
    }

    #[test]
    fn all_null_value_column_drops_rows_instead_of_imputing_nan() {
        let rows = vec![
            raw("s1", 0, "temperature", None, Some(90.0)),
            raw("s1", 1, "temperature", None, Some(91.0)),
        ];
        let out = clean(rows, &SensorConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn full_pipeline_is_deterministic() {
        let rows = vec![
            raw("s1", 0, "temperature", Some(25.0), Some(90.0)),
            raw("s2", 1, "humidity", Some(999.0), Some(85.0)),
        ];
        let mut config = SensorConfig::default();
        config.reading_types.insert(
            "humidity".to_string(),
            SensorThresholds {
                min: Some(0.0),
                max: Some(100.0),
                calibration: Default::default(),
            },
        );
        let out = clean(rows, &config);
        assert_eq!(out.len(), 2);
        let humidity = out.iter().find(|r| r.reading_type == "humidity").unwrap();
        assert_eq!(humidity.value, 100.0);
    }
}
