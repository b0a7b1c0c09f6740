//! `DataLoader`: partitions every `*_transformed` file by
//! (date, sensor_id) into the analytics dataset, Snappy-compressed, one row
//! group per input file per partition.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::PipelineContext;
use crate::duckdb_io::DuckDbIo;
use crate::security;

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub files_loaded: usize,
    pub partitions_written: usize,
}

pub async fn run(ctx: &PipelineContext, io: &DuckDbIo) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();
    for path in list_transformed_files(&ctx.transformed_dir)? {
        let has_date = io
            .schema_columns(path.clone())
            .await?
            .iter()
            .any(|c| c == "date");
        if !has_date {
            tracing::warn!(
                file = %path.display(),
                "transformed file has no date column; loading under date=unknown"
            );
        }

        let keys = io.partition_keys(path.clone(), has_date).await?;
        for (date, sensor_id) in keys {
            let partition_dir = ctx
                .analytics_dir
                .join(format!("date={date}"))
                .join(format!("sensor_id={sensor_id}"));
            let seq = next_sequence(&partition_dir)?;
            let dest = partition_dir.join(format!("part-{seq}.parquet"));
            io.copy_partition_rows(path.clone(), has_date, date, sensor_id, dest)
                .await?;
            summary.partitions_written += 1;
        }
        summary.files_loaded += 1;
    }
    Ok(summary)
}

/// Next row-group sequence number that doesn't collide with an existing
/// `part-<n>.parquet` in `partition_dir`.
fn next_sequence(partition_dir: &Path) -> Result<u64> {
    security::ensure_dir_mode(partition_dir, 0o750)?;
    let mut max_seen: Option<u64> = None;
    for entry in std::fs::read_dir(partition_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("part-") {
            if let Some(num) = rest.strip_suffix(".parquet") {
                if let Ok(n) = num.parse::<u64>() {
                    max_seen = Some(max_seen.map_or(n, |m| m.max(n)));
                }
            }
        }
    }
    Ok(max_seen.map_or(0, |n| n + 1))
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
