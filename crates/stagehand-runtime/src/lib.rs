//! Launch-side machinery for Stagehand guests.
//!
//! This crate builds the per-guest wrapper directory (content overlay,
//! manifest rewrite, flag merge, injected scripts), renders the cooperative
//! sandbox guard and mirrors its policy in Rust, overlays third-party SDK
//! modules, resolves a guest's entry point, checks host prerequisites, and
//! spawns the runtime process detached.

pub mod entry;
pub mod flags;
pub mod guard;
pub mod launcher;
pub mod manifest;
pub mod prereq;
pub mod sdk_overlay;
pub mod wrapper;

pub use entry::{find_index_html, ContentDetector, GuestContentEntry, WebContentDetector};
pub use flags::{append_flags, merge_flags, strip_disable_devtools, PROTECTION_FLAGS};
pub use guard::{GuardPolicy, SandboxViolation, ERR_NET_BLOCKED, ERR_SPAWN_BLOCKED, LOOPBACK_HOSTS};
pub use launcher::{command_line, launch, LaunchRequest, LaunchedProcess};
pub use prereq::{check_launch_prereqs, format_missing, MissingPrereq};
pub use sdk_overlay::{ensure_materialized_path, find_sdk_targets, overlay_sdk};
pub use wrapper::{
    build_wrapper, ExtraFile, PatchConfig, WrapperOptions, WrapperResult, WRAPPER_MARKER,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] stagehand_store::StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    WrapperInputMissing(String),
    #[error("runtime executable not found: {}", .0.display())]
    ExecutableMissing(PathBuf),
    #[error("{0}")]
    PrereqMissing(String),
    #[error("failed to start {}: {source}", executable.display())]
    SpawnFailed {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
