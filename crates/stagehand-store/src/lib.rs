//! On-disk layout, atomic writes, install records, and overlay primitives for Stagehand.
//!
//! This crate provides the storage layer: `DataLayout` for the data directory
//! structure, `atomic_write` and `swap_into_place` for crash-safe mutation,
//! `InstallStore` for per-family install discovery and removal, and
//! `link_or_copy` for the symlink-or-copy overlay used by wrappers.

pub mod fsutil;
pub mod install;
pub mod layout;
pub mod overlay;

pub use fsutil::{atomic_write, force_remove, swap_into_place, write_json_atomic};
pub use install::{
    find_app_bundle, has_greenworks_marker, read_install_metadata, write_install_metadata,
    InstallMetadata, InstallStore, INSTALL_METADATA_FILE, MKXPZ_APP_NAME,
};
pub use layout::{default_data_dir, DataLayout, NWJS_EXECUTABLE};
pub use overlay::{
    copy_dir_recursive, copy_tree_over, link_or_copy, probe_symlink, OverlayMode, OverlayOutcome,
    OverlayTally,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` survives power loss.
pub fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("install not found: {0}")]
    InstallNotFound(String),
    #[error("refusing to touch '{}': outside {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("invalid relative path: {0}")]
    InvalidPath(String),
}
