use crate::{fsync_dir, StoreError};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Write `bytes` to `path` via a temp file in the same directory and a rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value)?;
    atomic_write(path, content.as_bytes())
}

/// Remove a file, symlink or directory tree. Never fails.
///
/// Absence is success; any other error is logged and swallowed.
pub fn force_remove(path: &Path) {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            debug!("force_remove: stat {} failed: {e}", path.display());
            return;
        }
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("force_remove: {} failed: {e}", path.display()),
    }
}

/// Move a fully staged tree into its canonical location.
///
/// Any stale directory at `dest` is removed first. `staged` must be on the
/// same filesystem as `dest` so the rename is atomic for readers.
pub fn swap_into_place(staged: &Path, dest: &Path) -> Result<(), StoreError> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    force_remove(dest);
    fs::rename(staged, dest)?;
    fsync_dir(parent)?;
    debug!("installed {} -> {}", staged.display(), dest.display());
    Ok(())
}
