use std::path::PathBuf;

use thiserror::Error;

/// Typed failure kinds for the pipeline. `ConfigError` is fatal for the run;
/// `SchemaMismatch`/`FileReadError` isolate to a single file (quarantine);
/// `ParseError` drops a row; `ImputationInfeasible` leaves a column null
/// instead of failing the file; `ValidationAnomaly` is recorded in the
/// quality report rather than thrown.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("schema mismatch in {path}: missing columns {missing:?}")]
    SchemaMismatch { path: PathBuf, missing: Vec<String> },

    #[error("failed to read {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse timestamp {raw:?}")]
    ParseError { raw: String },

    #[error("column {column} is entirely null; imputation is infeasible")]
    ImputationInfeasible { column: String },

    #[error("validation anomaly in {file}: {detail}")]
    ValidationAnomaly { file: String, detail: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
