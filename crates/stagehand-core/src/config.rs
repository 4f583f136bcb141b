//! The `config.toml` file.
//!
//! Every field has a default, so a missing file (or a partial one) is valid.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use stagehand_remote::RemoteConfig;
use stagehand_store::default_data_dir;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CATALOG_TTL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Where MKXP-Z builds come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MkxpzConfig {
    pub repo: String,
    pub workflow: String,
    pub branch: String,
    /// Case-insensitive substring an artifact name must contain.
    pub artifact_needle: String,
    pub max_runs: u32,
    /// Directory holding `<version>/<name>.app` trees shipped with the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled_dir: Option<PathBuf>,
}

impl Default for MkxpzConfig {
    fn default() -> Self {
        Self {
            repo: "mkxp-z/mkxp-z".to_owned(),
            workflow: "autobuild.yml".to_owned(),
            branch: "dev".to_owned(),
            artifact_needle: "macos".to_owned(),
            max_runs: 20,
            bundled_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagehandConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub catalog_ttl_secs: u64,
    pub max_redirects: u32,
    pub remote: RemoteConfig,
    pub mkxpz: MkxpzConfig,
}

impl Default for StagehandConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            catalog_ttl_secs: DEFAULT_CATALOG_TTL_SECS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            remote: RemoteConfig::default(),
            mkxpz: MkxpzConfig::default(),
        }
    }
}

impl StagehandConfig {
    /// Defaults rooted at `data_dir`, for tests and embedding hosts.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let content = toml::to_string_pretty(self)?;
        stagehand_store::atomic_write(path, content.as_bytes())?;
        Ok(())
    }

    /// The configured data dir, else the environment/XDG default.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn catalog_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.catalog_ttl_secs).unwrap_or(i64::MAX))
    }
}

/// `$XDG_CONFIG_HOME/stagehand/config.toml`, else `~/.config/stagehand/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("stagehand/config.toml");
        }
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".config/stagehand/config.toml"),
        Err(_) => PathBuf::from("stagehand.toml"),
    }
}
