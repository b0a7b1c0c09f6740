use anyhow::Result;
use clap::Parser;

use agri_pipeline::cli::{self, Command};
use agri_pipeline::config::PipelineContext;
use agri_pipeline::duckdb_io::DuckDbIo;
use agri_pipeline::{ingest, loader, quality, transform};

#[tokio::main]
async fn main() -> Result<()> {
    agri_pipeline::security::apply_umask();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let ctx = match PipelineContext::from_env() {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::error!(error = %err, "fatal configuration error");
            std::process::exit(1);
        }
    };

    let io = DuckDbIo::new(
        std::env::temp_dir().join("agri-pipeline"),
        args.max_concurrency,
    );

    let result = match args.command {
        Command::Ingest => run_ingest(&ctx, &io).await,
        Command::Transform => run_transform(&ctx, &io).await,
        Command::Validate => run_validate(&ctx, &io).await,
        Command::Load => run_load(&ctx, &io).await,
        Command::RunAll => run_all(&ctx, &io).await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = %err, "pipeline run failed");
            std::process::exit(1);
        }
    }
}

async fn run_ingest(ctx: &PipelineContext, io: &DuckDbIo) -> Result<()> {
    let summary = ingest::run(ctx, io).await?;
    tracing::info!(
        succeeded = summary.succeeded,
        quarantined = summary.quarantined,
        failed = summary.failed,
        "ingest complete"
    );
    Ok(())
}

async fn run_transform(ctx: &PipelineContext, io: &DuckDbIo) -> Result<()> {
    let summary = transform::run(ctx, io).await?;
    tracing::info!(
        transformed = summary.transformed,
        skipped = summary.skipped_already_transformed,
        failed = summary.failed,
        "transform complete"
    );
    Ok(())
}

async fn run_validate(ctx: &PipelineContext, io: &DuckDbIo) -> Result<()> {
    let reports = quality::run(ctx, io).await?;
    tracing::info!(files = reports.len(), "validation complete");
    Ok(())
}

async fn run_load(ctx: &PipelineContext, io: &DuckDbIo) -> Result<()> {
    let summary = loader::run(ctx, io).await?;
    tracing::info!(
        files_loaded = summary.files_loaded,
        partitions_written = summary.partitions_written,
        "load complete"
    );
    Ok(())
}

async fn run_all(ctx: &PipelineContext, io: &DuckDbIo) -> Result<()> {
    run_ingest(ctx, io).await?;
    run_transform(ctx, io).await?;
    run_validate(ctx, io).await?;
    run_load(ctx, io).await?;
    Ok(())
}
