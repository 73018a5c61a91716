//! File backups before destructive passes

use recon_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// `<dir>/<stem>.<tag>_<unix millis>.<ext>`
pub fn backup_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let millis = recon_common::time::now().timestamp_millis();
    let file_name = match path.extension() {
        Some(ext) => format!("{}.{}_{}.{}", stem, tag, millis, ext.to_string_lossy()),
        None => format!("{}.{}_{}", stem, tag, millis),
    };
    path.with_file_name(file_name)
}

/// Copy `path` next to itself under a tagged name
pub fn create_backup(path: &Path, tag: &str) -> Result<PathBuf> {
    let target = backup_path(path, tag);
    std::fs::copy(path, &target)
        .map_err(|e| Error::FileIo(format!("Backup of {} failed: {}", path.display(), e)))?;
    info!(source = %path.display(), backup = %target.display(), "Backup created");
    Ok(target)
}
