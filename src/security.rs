use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[cfg(unix)]
pub fn apply_umask() {
    unsafe {
        libc::umask(0o027);
    }
}

#[cfg(not(unix))]
pub fn apply_umask() {}

pub fn ensure_dir_mode(path: &Path, mode: u32) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    #[cfg(unix)]
    {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to chmod {} to {:o}", path.display(), mode))?;
    }
    Ok(())
}

pub fn ensure_file_mode(path: &Path, mode: u32) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to chmod {} to {:o}", path.display(), mode))?;
    }
    Ok(())
}

/// Serialize `value` to pretty JSON and persist it atomically at `path`:
/// write into a temp file in the same directory, flush, then rename over
/// the destination. Parent directory and resulting file get `0o750`/`0o600`
/// applied.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir_mode(parent, 0o750)?;

    let contents = serde_json::to_vec_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(&contents)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("failed to persist {}: {err}", path.display()))?;
    let _ = ensure_file_mode(path, 0o600);
    Ok(())
}

/// Write raw bytes atomically at `path`, same temp-then-rename discipline
/// as [`atomic_write_json`].
pub fn atomic_write_bytes(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir_mode(parent, 0o750)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("failed to persist {}: {err}", path.display()))?;
    let _ = ensure_file_mode(path, 0o600);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn atomic_write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("sample.json");
        let value = Sample {
            a: 7,
            b: "hi".to_string(),
        };
        atomic_write_json(&path, &value).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let parsed: Sample = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn atomic_write_bytes_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("file.bin");
        atomic_write_bytes(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
