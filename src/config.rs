use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::error::PipelineError;
use crate::model::SensorConfig;

fn env_path(key: &str, default: &str) -> PathBuf {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                PathBuf::from(default)
            } else {
                PathBuf::from(trimmed)
            }
        }
        Err(_) => PathBuf::from(default),
    }
}

/// Paths and loaded config threaded through every stage, resolved once at
/// process start. Avoids module-level singletons: each stage takes
/// `&PipelineContext` explicitly.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub transformed_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub analytics_dir: PathBuf,
    pub sensor_config_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub metadata_dir: PathBuf,
    pub sensor_config: SensorConfig,
}

impl PipelineContext {
    /// Resolves every path from its environment variable (falling back to
    /// hard-coded defaults) and loads `sensor_config.json`. A missing or
    /// unparseable sensor config is a fatal `ConfigError` — every other
    /// directory is created on demand by the stage that needs it.
    pub fn from_env() -> Result<Self, PipelineError> {
        let raw_dir = env_path("RAW_DATA_PATH", "data/raw");
        let processed_dir = env_path("PROCESSED_DATA_PATH", "data/processed");
        let transformed_dir = env_path("TRANSFORMED_DATA_PATH", "data/processed");
        let quarantine_dir = env_path("QUARANTINE_DATA_PATH", "data/quarantine");
        let analytics_dir = env_path("ANALYTICS_DATA_PATH", "data/analytics");
        let sensor_config_path = env_path("SENSOR_CONFIG_PATH", "config/sensor_config.json");
        let checkpoint_path = env_path("CHECKPOINT_PATH", "state/checkpoints.json");
        let metadata_dir = PathBuf::from("metadata");

        let sensor_config = load_sensor_config(&sensor_config_path)?;

        Ok(Self {
            raw_dir,
            processed_dir,
            transformed_dir,
            quarantine_dir,
            analytics_dir,
            sensor_config_path,
            checkpoint_path,
            metadata_dir,
            sensor_config,
        })
    }

    pub fn ingest_log_path(&self) -> PathBuf {
        self.metadata_dir.join("ingest_log.csv")
    }

    pub fn quality_report_path(&self) -> PathBuf {
        self.metadata_dir.join("data_quality_report.csv")
    }
}

fn load_sensor_config(path: &std::path::Path) -> Result<SensorConfig, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::ConfigError(format!(
            "sensor config not found at {}",
            path.display()
        )));
    }
    let contents = std::fs::read_to_string(path).map_err(|err| {
        PipelineError::ConfigError(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_json::from_str(&contents).map_err(|err| {
        PipelineError::ConfigError(format!("failed to parse {}: {err}", path.display()))
    })
}

/// Writes a default `sensor_config.json` at `path` if one does not already
/// exist, used by tests and first-run bootstrapping. Not part of the
/// runtime contract — production configs are managed by the orchestrator.
pub fn write_default_sensor_config(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let contents = serde_json::json!({
        "temperature": {"min": -10.0, "max": 60.0, "calibration": {"multiplier": 1.0, "offset": 0.0}},
        "humidity": {"min": 0.0, "max": 100.0, "calibration": {"multiplier": 1.0, "offset": 0.0}},
        "soil_moisture": {"min": 0.0, "max": 100.0, "calibration": {"multiplier": 1.0, "offset": 0.0}},
        "light_intensity": {"min": 0.0, "max": 100000.0, "calibration": {"multiplier": 1.0, "offset": 0.0}},
        "ph_level": {"min": 0.0, "max": 14.0, "calibration": {"multiplier": 1.0, "offset": 0.0}},
    });
    std::fs::write(path, serde_json::to_vec_pretty(&contents)?)
        .with_context(|| format!("failed to write {}", path.display()))
}
