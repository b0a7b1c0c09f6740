//! `IngestionRunner`: validates schema, reads, profiles, and
//! copies each new raw file to `processed/`, updating the checkpoint and
//! append-only ingestion log as it goes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::checkpoint::CheckpointState;
use crate::config::PipelineContext;
use crate::duckdb_io::DuckDbIo;
use crate::model::{CheckpointRecord, CheckpointStatus, IngestionLogEntry};
use crate::scanner;
use crate::schema;
use crate::security;

/// Outcome of ingesting the set of new files currently eligible per the
/// checkpoint.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub succeeded: usize,
    pub quarantined: usize,
    pub failed: usize,
}

pub async fn run(ctx: &PipelineContext, io: &DuckDbIo) -> Result<IngestSummary> {
    let mut checkpoint = CheckpointState::load(&ctx.checkpoint_path);
    let files = scanner::list_new_files(&ctx.raw_dir, &checkpoint);

    let mut summary = IngestSummary::default();
    for path in files {
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        // Quarantined/failed files stay in the checkpoint and are not
        // retried automatically; only
        // files with no prior terminal record at all get attempted.
        if checkpoint.processed_files.contains_key(&basename) {
            continue;
        }

        let outcome = ingest_one(ctx, io, &path, &basename).await;
        match &outcome {
            Ok((record, entry)) => {
                checkpoint.record(basename.clone(), record.clone());
                match record.status {
                    CheckpointStatus::Success => summary.succeeded += 1,
                    CheckpointStatus::Quarantined => summary.quarantined += 1,
                    CheckpointStatus::Failed => summary.failed += 1,
                }
                append_log_entry(&ctx.ingest_log_path(), entry)?;
            }
            Err(err) => {
                // Fatal (e.g. filesystem failure moving to quarantine):
                // propagate, aborting the stage.
                return Err(anyhow::anyhow!("{err:#}"));
            }
        }
        checkpoint
            .save(&ctx.checkpoint_path)
            .context("failed to persist checkpoint")?;
    }

    Ok(summary)
}

async fn ingest_one(
    ctx: &PipelineContext,
    io: &DuckDbIo,
    path: &Path,
    basename: &str,
) -> Result<(CheckpointRecord, IngestionLogEntry)> {
    let started = Instant::now();

    let validation = schema::validate(io, path.to_path_buf()).await;
    let validation = match validation {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(file = basename, error = %err, "schema inspection failed; quarantining");
            return quarantine(ctx, path, basename, started, format!("{err:#}"));
        }
    };

    if !validation.ok {
        tracing::warn!(
            file = basename,
            missing = ?validation.missing,
            "schema validation failed; quarantining"
        );
        return quarantine(
            ctx,
            path,
            basename,
            started,
            format!("missing columns: {:?}", validation.missing),
        );
    }

    let row_count = match io.row_count(path.to_path_buf()).await {
        Ok(n) => n,
        Err(err) => {
            tracing::warn!(file = basename, error = %err, "failed to read file; quarantining");
            return quarantine(ctx, path, basename, started, format!("{err:#}"));
        }
    };

    let profile = io.profile(path.to_path_buf()).await.unwrap_or_default();
    for row in &profile {
        tracing::info!(
            file = basename,
            reading_type = row.reading_type,
            count = row.record_count,
            avg_value = row.avg_value,
            avg_battery = row.avg_battery,
            "profiled reading type"
        );
    }

    let dest = ctx
        .processed_dir
        .join(processed_filename(basename));
    if let Err(err) = io.copy_parquet(path.to_path_buf(), dest).await {
        tracing::warn!(file = basename, error = %err, "failed to write processed file; quarantining");
        return quarantine(ctx, path, basename, started, format!("{err:#}"));
    }

    let checksum = sha256_file(path).context("failed to checksum raw file")?;
    let record = CheckpointRecord {
        checksum,
        rows: row_count.max(0) as usize,
        status: CheckpointStatus::Success,
        processed_at: Utc::now(),
    };
    let entry = IngestionLogEntry {
        filename: basename.to_string(),
        rows: record.rows,
        status: CheckpointStatus::Success,
        error: String::new(),
        duration_sec: started.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
    };
    Ok((record, entry))
}

fn quarantine(
    ctx: &PipelineContext,
    path: &Path,
    basename: &str,
    started: Instant,
    error: String,
) -> Result<(CheckpointRecord, IngestionLogEntry)> {
    security::ensure_dir_mode(&ctx.quarantine_dir, 0o750)?;
    let dest = ctx.quarantine_dir.join(basename);
    std::fs::rename(path, &dest)
        .or_else(|_| std::fs::copy(path, &dest).map(|_| ()).and_then(|_| std::fs::remove_file(path)))
        .with_context(|| format!("failed to move {} to quarantine", path.display()))?;

    let record = CheckpointRecord {
        checksum: String::new(),
        rows: 0,
        status: CheckpointStatus::Quarantined,
        processed_at: Utc::now(),
    };
    let entry = IngestionLogEntry {
        filename: basename.to_string(),
        rows: 0,
        status: CheckpointStatus::Quarantined,
        error,
        duration_sec: started.elapsed().as_secs_f64(),
        timestamp: Utc::now(),
    };
    Ok((record, entry))
}

fn processed_filename(basename: &str) -> String {
    match basename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_processed.{ext}"),
        None => format!("{basename}_processed"),
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}

fn append_log_entry(path: &Path, entry: &IngestionLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        security::ensure_dir_mode(parent, 0o750)?;
    }
    let write_header = !path.exists();
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut line = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut line);
        if write_header {
            writer.write_record([
                "filename",
                "rows",
                "status",
                "error",
                "duration_sec",
                "timestamp",
            ])?;
        }
        writer.write_record([
            entry.filename.as_str(),
            &entry.rows.to_string(),
            &entry.status.to_string(),
            entry.error.as_str(),
            &entry.duration_sec.to_string(),
            &entry.timestamp.to_rfc3339(),
        ])?;
        writer.flush()?;
    }
    file.write_all(&line)?;
    file.sync_all()?;
    Ok(())
}
