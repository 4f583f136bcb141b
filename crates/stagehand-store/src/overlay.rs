//! Symlink-or-copy overlay primitives.
//!
//! Callers probe once whether the destination filesystem accepts symlinks and
//! pass the resulting [`OverlayMode`] down; every placement reports which path
//! it actually took as an [`OverlayOutcome`].

use crate::fsutil::force_remove;
use crate::StoreError;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    Link,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayOutcome {
    Linked,
    Copied,
    /// Destination already existed and was left alone.
    Skipped,
}

/// Per-outcome counts across one overlay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverlayTally {
    pub linked: usize,
    pub copied: usize,
    pub skipped: usize,
}

impl OverlayTally {
    pub fn record(&mut self, outcome: OverlayOutcome) {
        match outcome {
            OverlayOutcome::Linked => self.linked += 1,
            OverlayOutcome::Copied => self.copied += 1,
            OverlayOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Whether symlinks can be created inside `dir`.
pub fn probe_symlink(dir: &Path) -> OverlayMode {
    #[cfg(unix)]
    {
        let probe = dir.join(".stagehand-link-probe");
        force_remove(&probe);
        let ok = std::os::unix::fs::symlink(".", &probe).is_ok();
        force_remove(&probe);
        if ok {
            return OverlayMode::Link;
        }
    }
    debug!("symlinks unsupported in {}, copying", dir.display());
    OverlayMode::Copy
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Place `src` at `dest` unless something (even a dangling link) is already there.
pub fn link_or_copy(src: &Path, dest: &Path, mode: OverlayMode) -> Result<OverlayOutcome, StoreError> {
    if exists_no_follow(dest) {
        return Ok(OverlayOutcome::Skipped);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    if mode == OverlayMode::Link {
        match std::os::unix::fs::symlink(src, dest) {
            Ok(()) => return Ok(OverlayOutcome::Linked),
            Err(e) => debug!("symlink {} failed ({e}), copying", dest.display()),
        }
    }
    let _ = mode;
    copy_entry(src, dest)?;
    Ok(OverlayOutcome::Copied)
}

fn copy_entry(src: &Path, dest: &Path) -> Result<(), StoreError> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)
    } else if meta.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        fs::copy(src, dest)?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), StoreError> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), StoreError> {
    if src.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        fs::copy(src, dest)?;
        Ok(())
    }
}

/// Copy a directory tree, preserving symlinks and file modes.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let ft = entry.file_type()?;
        if ft.is_symlink() {
            force_remove(&to);
            copy_symlink(&from, &to)?;
        } else if ft.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Copy `src` over `dest`, replacing anything in the way.
///
/// A symlink found at a destination path is unlinked before the write so the
/// copy never lands in whatever the link pointed at.
pub fn copy_tree_over(src: &Path, dest: &Path) -> Result<(), StoreError> {
    if fs::symlink_metadata(dest).is_ok_and(|m| !m.is_dir()) {
        force_remove(dest);
    }
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_tree_over(&from, &to)?;
        } else {
            if fs::symlink_metadata(&to).is_ok() {
                force_remove(&to);
            }
            if ft.is_symlink() {
                copy_symlink(&from, &to)?;
            } else {
                fs::copy(&from, &to)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("www/img")).unwrap();
        fs::write(dir.path().join("www/index.html"), "<html>").unwrap();
        fs::write(dir.path().join("www/img/a.png"), "png").unwrap();
        fs::write(dir.path().join("Game.exe"), "bin").unwrap();
        dir
    }

    #[cfg(unix)]
    #[test]
    fn link_mode_creates_symlinks() {
        let src = guest();
        let out = tempfile::tempdir().unwrap();
        assert_eq!(probe_symlink(out.path()), OverlayMode::Link);
        let dest = out.path().join("www");
        let outcome = link_or_copy(&src.path().join("www"), &dest, OverlayMode::Link).unwrap();
        assert_eq!(outcome, OverlayOutcome::Linked);
        assert!(fs::symlink_metadata(&dest).unwrap().file_type().is_symlink());
        assert!(dest.join("index.html").exists());
    }

    #[test]
    fn copy_mode_copies_trees() {
        let src = guest();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("www");
        let outcome = link_or_copy(&src.path().join("www"), &dest, OverlayMode::Copy).unwrap();
        assert_eq!(outcome, OverlayOutcome::Copied);
        assert!(fs::symlink_metadata(&dest).unwrap().is_dir());
        assert_eq!(fs::read_to_string(dest.join("img/a.png")).unwrap(), "png");
    }

    #[test]
    fn existing_destination_is_skipped() {
        let src = guest();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("Game.exe");
        fs::write(&dest, "mine").unwrap();
        let outcome = link_or_copy(&src.path().join("Game.exe"), &dest, OverlayMode::Copy).unwrap();
        assert_eq!(outcome, OverlayOutcome::Skipped);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "mine");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_counts_as_existing() {
        let src = guest();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("Game.exe");
        std::os::unix::fs::symlink(out.path().join("gone"), &dest).unwrap();
        let outcome = link_or_copy(&src.path().join("Game.exe"), &dest, OverlayMode::Link).unwrap();
        assert_eq!(outcome, OverlayOutcome::Skipped);
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_over_does_not_write_through_links() {
        let shared = tempfile::tempdir().unwrap();
        fs::write(shared.path().join("greenworks.js"), "original").unwrap();

        let target = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(
            shared.path().join("greenworks.js"),
            target.path().join("greenworks.js"),
        )
        .unwrap();

        let sdk = tempfile::tempdir().unwrap();
        fs::create_dir(sdk.path().join("lib")).unwrap();
        fs::write(sdk.path().join("greenworks.js"), "sdk").unwrap();
        fs::write(sdk.path().join("lib/steam.dylib"), "so").unwrap();

        copy_tree_over(sdk.path(), target.path()).unwrap();
        assert_eq!(fs::read_to_string(shared.path().join("greenworks.js")).unwrap(), "original");
        assert_eq!(fs::read_to_string(target.path().join("greenworks.js")).unwrap(), "sdk");
        assert!(target.path().join("lib/steam.dylib").is_file());
    }

    #[test]
    fn tally_counts_outcomes() {
        let mut t = OverlayTally::default();
        t.record(OverlayOutcome::Linked);
        t.record(OverlayOutcome::Linked);
        t.record(OverlayOutcome::Skipped);
        assert_eq!((t.linked, t.copied, t.skipped), (2, 0, 1));
    }
}
