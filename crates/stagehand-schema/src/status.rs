use crate::types::PlatformKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where an install came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallSource {
    Download { url: String },
    GithubRelease { url: String },
    GithubActions { run_id: u64 },
    Bundled,
    /// Found on disk without a readable metadata record.
    Unknown,
}

impl fmt::Display for InstallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallSource::Download { .. } => f.write_str("download"),
            InstallSource::GithubRelease { .. } => f.write_str("GitHub release"),
            InstallSource::GithubActions { .. } => f.write_str("GitHub Actions"),
            InstallSource::Bundled => f.write_str("Bundled"),
            InstallSource::Unknown => f.write_str("unknown"),
        }
    }
}

/// A runtime present on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRuntime {
    pub version: String,
    pub platform_key: Option<PlatformKey>,
    pub variant: Option<String>,
    pub install_dir: PathBuf,
    /// The binary to spawn; `None` for SDK families that are overlaid, not run.
    pub executable_path: Option<PathBuf>,
    pub source: InstallSource,
}

impl InstalledRuntime {
    /// `<version>-<platform>-<variant>`, used to key per-runtime profile state.
    pub fn signature(&self) -> String {
        let mut sig = self.version.clone();
        if let Some(ref key) = self.platform_key {
            sig.push('-');
            sig.push_str(key.as_str());
        }
        if let Some(ref variant) = self.variant {
            sig.push('-');
            sig.push_str(variant);
        }
        sig
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Cached view of a family's installable versions.
///
/// Replaced wholesale on every refresh. A failed refresh clears `versions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogState {
    pub status: CatalogStatus,
    /// Newest first.
    pub versions: Vec<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub error: Option<String>,
}

impl CatalogState {
    pub fn succeeded(versions: Vec<String>, source: impl Into<String>) -> Self {
        Self {
            status: CatalogStatus::Success,
            versions,
            fetched_at: Some(Utc::now()),
            source: Some(source.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: CatalogStatus::Error,
            versions: Vec::new(),
            fetched_at: Some(Utc::now()),
            source: None,
            error: Some(error.into()),
        }
    }

    /// A successful state younger than `ttl` can be served without a refetch.
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.status == CatalogStatus::Success
            && self.fetched_at.is_some_and(|at| now - at < ttl)
    }

    pub fn latest(&self) -> Option<&str> {
        self.versions.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Downloading,
    Extracting,
    Error,
}

/// Live snapshot of the in-flight install of one family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    pub version: String,
    pub variant: Option<String>,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub status: InstallStatus,
    pub error: Option<String>,
}

impl InstallState {
    pub fn started(version: &str, variant: Option<&str>) -> Self {
        Self {
            version: version.to_owned(),
            variant: variant.map(str::to_owned),
            downloaded: 0,
            total: None,
            status: InstallStatus::Downloading,
            error: None,
        }
    }
}
