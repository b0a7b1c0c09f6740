//! `FeatureEngineer`: derives `daily_avg`, `rolling_7d_avg`,
//! and `anomalous_reading` over a single file's rows, grouped in memory.

use std::collections::BTreeMap;

use crate::model::{Reading, SensorConfig};

/// Mutates `rows` in place: `daily_avg` per (sensor_id, reading_type, date)
/// broadcast to every row in the group; `rolling_7d_avg` per (sensor_id,
/// reading_type) ordered by timestamp ascending over a trailing window of
/// up to 7 rows; `anomalous_reading` from the configured `[min, max]`.
/// Sort order for the rolling computation is `(sensor_id, reading_type,
/// timestamp, row-ingestion-order)`, stable given identical inputs.
pub fn engineer(mut rows: Vec<Reading>, config: &SensorConfig) -> Vec<Reading> {
    apply_daily_avg(&mut rows);
    apply_rolling_7d_avg(&mut rows);
    apply_anomalous_flag(&mut rows, config);
    rows
}

fn apply_daily_avg(rows: &mut [Reading]) {
    let mut sums: BTreeMap<(String, String, chrono::NaiveDate), (f64, usize)> = BTreeMap::new();
    for row in rows.iter() {
        let key = (row.sensor_id.clone(), row.reading_type.clone(), row.date);
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += row.value;
        entry.1 += 1;
    }
    for row in rows.iter_mut() {
        let key = (row.sensor_id.clone(), row.reading_type.clone(), row.date);
        let (sum, count) = sums[&key];
        row.daily_avg = sum / count as f64;
    }
}

fn apply_rolling_7d_avg(rows: &mut [Reading]) {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| {
        (
            &rows[a].sensor_id,
            &rows[a].reading_type,
            rows[a].timestamp,
            a,
        )
            .cmp(&(&rows[b].sensor_id, &rows[b].reading_type, rows[b].timestamp, b))
    });

    let mut window: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for &idx in &order {
        let key = (rows[idx].sensor_id.clone(), rows[idx].reading_type.clone());
        let values = window.entry(key).or_default();
        values.push(rows[idx].value);
        if values.len() > 7 {
            values.remove(0);
        }
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        rows[idx].rolling_7d_avg = avg;
    }
}

fn apply_anomalous_flag(rows: &mut [Reading], config: &SensorConfig) {
    for row in rows.iter_mut() {
        let thresholds = config.thresholds_for(&row.reading_type);
        row.anomalous_reading = thresholds.is_out_of_range(row.value);
    }
}
