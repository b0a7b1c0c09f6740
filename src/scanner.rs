//! `FileScanner`: discovers new input files by consulting
//! the checkpoint store.

use std::path::PathBuf;

use crate::checkpoint::CheckpointState;

/// Returns every columnar file directly under `raw_dir` whose basename is
/// not recorded with status `success` in `checkpoint`, sorted
/// lexicographically by basename. A missing `raw_dir` yields an empty
/// result rather than an error.
pub fn list_new_files(raw_dir: &std::path::Path, checkpoint: &CheckpointState) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(raw_dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("parquet"))
                .unwrap_or(false)
        })
        .filter(|path| {
            let basename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            !checkpoint.is_success(basename)
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}
