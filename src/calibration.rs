//! `CalibrationService`: applies the per-`reading_type`
//! affine calibration `value <- value * multiplier + offset`.

use crate::model::{CleanReading, SensorConfig};

/// Applies calibration in place. A `reading_type` absent from `config`
/// passes through unchanged (identity multiplier 1.0, offset 0.0).
pub fn calibrate(mut rows: Vec<CleanReading>, config: &SensorConfig) -> Vec<CleanReading> {
    for row in &mut rows {
        let thresholds = config.thresholds_for(&row.reading_type);
        row.value = row.value * thresholds.calibration.multiplier + thresholds.calibration.offset;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Calibration, SensorThresholds};
    use chrono::Utc;

    fn reading(reading_type: &str, value: f64) -> CleanReading {
        CleanReading {
            sensor_id: "s1".to_string(),
            reading_type: reading_type.to_string(),
            timestamp: Utc::now(),
            value,
            battery_level: 90.0,
        }
    }

    #[test]
    fn applies_affine_calibration_exactly() {
        let mut config = SensorConfig::default();
        config.reading_types.insert(
            "temperature".to_string(),
            SensorThresholds {
                min: None,
                max: None,
                calibration: Calibration {
                    multiplier: 1.02,
                    offset: 0.5,
                },
            },
        );
        let out = calibrate(vec![reading("temperature", 25.0)], &config);
        assert_eq!(out[0].value, 26.0);
    }

    #[test]
    fn unknown_reading_type_passes_through_unchanged() {
        let out = calibrate(vec![reading("wind_speed", 12.5)], &SensorConfig::default());
        assert_eq!(out[0].value, 12.5);
    }
}
