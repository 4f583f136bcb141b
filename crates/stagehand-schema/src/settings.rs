//! Persisted per-family runtime preferences.
//!
//! The on-disk document only holds user choices. Install progress and catalog
//! state are reported next to it but never written back.

use crate::family::{FamilyId, RuntimeFamily, GREENWORKS};
use crate::platform::normalize_variant;
use crate::version::normalize_version;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_variant: Option<String>,
    /// Greenworks build to overlay into NW.js wrappers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greenworks_default_version: Option<String>,
    #[serde(default = "default_true")]
    pub enable_protections: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub enable_user_scripts: bool,
}

impl Default for FamilySettings {
    fn default() -> Self {
        Self {
            default_version: None,
            default_variant: None,
            greenworks_default_version: None,
            enable_protections: true,
            case_insensitive: false,
            enable_user_scripts: false,
        }
    }
}

impl FamilySettings {
    /// Canonical form of these settings for `family`.
    ///
    /// Versions are trimmed and normalized; ones that fail the family grammar
    /// are dropped. An unknown variant falls back to the family default.
    pub fn normalized(&self, family: &RuntimeFamily) -> Self {
        let clean = |family: &RuntimeFamily, v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .and_then(|v| normalize_version(family, v).ok())
        };
        let default_variant = normalize_variant(family, self.default_variant.as_deref())
            .unwrap_or_else(|_| family.default_variant().map(str::to_owned));
        let greenworks_default_version = if family.id == FamilyId::Nwjs {
            clean(&GREENWORKS, &self.greenworks_default_version)
        } else {
            None
        };
        Self {
            default_version: clean(family, &self.default_version),
            default_variant,
            greenworks_default_version,
            enable_protections: self.enable_protections,
            case_insensitive: self.case_insensitive,
            enable_user_scripts: self.enable_user_scripts,
        }
    }
}

/// The `settings.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub runtimes: BTreeMap<FamilyId, FamilySettings>,
}

/// A user-initiated settings change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsAction {
    SetDefault {
        version: String,
        variant: Option<String>,
    },
    ClearDefault,
    SetGreenworksDefault(Option<String>),
    SetProtections(bool),
    SetCaseInsensitive(bool),
    SetUserScripts(bool),
}

impl Settings {
    /// Normalized settings for `id`; defaults when the family has no entry.
    pub fn family(&self, id: FamilyId) -> FamilySettings {
        self.runtimes
            .get(&id)
            .cloned()
            .unwrap_or_default()
            .normalized(id.descriptor())
    }

    pub fn family_mut(&mut self, id: FamilyId) -> &mut FamilySettings {
        self.runtimes.entry(id).or_default()
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| SchemaError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }
}
