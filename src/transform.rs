//! `TransformationRunner`: sequences Cleaner -> Calibration
//! -> TimestampProcessor -> FeatureEngineer over each `*_processed` file,
//! writing `<basename>_transformed.<ext>`. A failure in any substep aborts
//! only that file.

use std::path::PathBuf;

use anyhow::Result;

use crate::calibration;
use crate::clean;
use crate::config::PipelineContext;
use crate::duckdb_io::DuckDbIo;
use crate::features;
use crate::time;

#[derive(Debug, Default)]
pub struct TransformSummary {
    pub transformed: usize,
    pub skipped_already_transformed: usize,
    pub failed: usize,
}

/// Runs transformation over every `*_processed` file under
/// `ctx.processed_dir` that doesn't already have a matching
/// `*_transformed` output — re-running is then a no-op, since transforms
/// consume `_processed`, never `_transformed`.
pub async fn run(ctx: &PipelineContext, io: &DuckDbIo) -> Result<TransformSummary> {
    let mut summary = TransformSummary::default();
    let files = list_processed_files(&ctx.processed_dir)?;

    for path in files {
        let dest = transformed_path(ctx, &path);
        if dest.exists() {
            summary.skipped_already_transformed += 1;
            continue;
        }
        match transform_one(ctx, io, &path, &dest).await {
            Ok(()) => summary.transformed += 1,
            Err(err) => {
                let name = path.display().to_string();
                tracing::error!(file = name, error = %err, "transformation failed for file");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

async fn transform_one(
    ctx: &PipelineContext,
    io: &DuckDbIo,
    path: &std::path::Path,
    dest: &std::path::Path,
) -> Result<()> {
    let raw = io.read_raw_readings(path.to_path_buf()).await?;
    let cleaned = clean::clean(raw, &ctx.sensor_config);
    let calibrated = calibration::calibrate(cleaned, &ctx.sensor_config);
    let timestamped = time::process(calibrated);
    let featured = features::engineer(timestamped, &ctx.sensor_config);

    let tmp_dir = ctx.processed_dir.join(".tmp");
    let io_tmp = DuckDbIo::new(tmp_dir, 2);
    let staging = dest.with_extension("parquet.tmp");
    io_tmp.write_readings(staging.clone(), featured).await?;
    std::fs::rename(&staging, dest)
        .or_else(|_| -> std::io::Result<()> {
            std::fs::copy(&staging, dest)?;
            std::fs::remove_file(&staging)
        })?;
    Ok(())
}

fn list_processed_files(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
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
                .map(|s| s.ends_with("_processed"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn transformed_path(ctx: &PipelineContext, processed_path: &std::path::Path) -> PathBuf {
    let stem = processed_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = processed_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("parquet");
    let base = stem.strip_suffix("_processed").unwrap_or(stem);
    ctx.transformed_dir.join(format!("{base}_transformed.{ext}"))
}
