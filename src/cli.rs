use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "agri-pipeline",
    version,
    about = "Batch pipeline for agricultural IoT sensor readings"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum concurrent DuckDB connections for file-level fan-out.
    #[arg(long, default_value_t = 4)]
    pub max_concurrency: usize,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discover and ingest new files from `raw/` into `processed/`.
    Ingest,
    /// Clean, calibrate, and feature-engineer `*_processed` files.
    Transform,
    /// Run quality checks over `*_transformed` files and write the report.
    Validate,
    /// Load `*_transformed` files into the partitioned analytics dataset.
    Load,
    /// Run ingest, transform, validate, and load in sequence.
    RunAll,
}
