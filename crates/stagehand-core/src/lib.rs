//! Runtime provisioning and launch orchestration for Stagehand.
//!
//! This crate ties the schema, store, remote and runtime layers together into
//! the `ProvisioningService`: per-family catalog caching with a single
//! in-flight refresh, the installation coordinator with a per-family in-flight
//! slot and a cross-process lock, settings reconciliation after installs and
//! uninstalls, the reported state of each family, and launch preparation
//! (install check, wrapper build, SDK overlay, spawn).

pub mod concurrency;
pub mod config;
pub mod families;
pub mod install;
pub mod launch;
pub mod reconcile;
pub mod report;
pub mod service;

pub use concurrency::{install_signal_handler, shutdown_requested, Flight, StoreLock};
pub use config::{MkxpzConfig, StagehandConfig};
pub use install::{InstallOutcome, ProgressEvent};
pub use launch::{CleanupReport, GuestLaunch, LaunchReport, WrappedGuest};
pub use reconcile::{after_install, after_uninstall, apply_action};
pub use report::{CatalogReport, FamilyReport};
pub use service::{ProvisioningService, UninstallTarget};

use stagehand_schema::SchemaError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    InvalidVersion(SchemaError),
    #[error("{0}")]
    NotInstalled(String),
    #[error("{family} download failed: {source}")]
    DownloadFailed {
        family: &'static str,
        #[source]
        source: stagehand_remote::RemoteError,
    },
    #[error("{family} extraction failed: {reason}")]
    ExtractionFailed { family: &'static str, reason: String },
    #[error("refusing to remove bundled runtime at {}", .0.display())]
    BundledRuntime(PathBuf),
    #[error("interrupted")]
    Interrupted,
    /// Outcome of an operation shared by every caller that joined it.
    #[error(transparent)]
    Shared(Arc<CoreError>),
    #[error("schema error: {0}")]
    Schema(SchemaError),
    #[error("store error: {0}")]
    Store(#[from] stagehand_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] stagehand_runtime::RuntimeError),
    #[error("remote error: {0}")]
    Remote(#[from] stagehand_remote::RemoteError),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("config serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SchemaError> for CoreError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::InvalidVersion { .. } | SchemaError::InvalidVariant { .. } => {
                CoreError::InvalidVersion(e)
            }
            other => CoreError::Schema(other),
        }
    }
}

impl CoreError {
    /// The underlying error, looking through shared in-flight outcomes.
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether the caller supplied something unusable (bad version, family or variant).
    pub fn is_usage(&self) -> bool {
        matches!(
            self.root(),
            CoreError::InvalidVersion(_) | CoreError::Schema(SchemaError::UnknownFamily(_))
        )
    }

    pub fn is_not_installed(&self) -> bool {
        matches!(self.root(), CoreError::NotInstalled(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.root(), CoreError::Interrupted)
    }
}
