//! Install records and per-family discovery of runtimes on disk.

use crate::fsutil::{force_remove, write_json_atomic};
use crate::layout::DataLayout;
use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_schema::version::{compare_versions, is_valid_version};
use stagehand_schema::{FamilyId, InstallSource, InstalledRuntime, PlatformKey};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const INSTALL_METADATA_FILE: &str = ".stagehand-install.json";

/// Preferred app bundle name inside an MKXP-Z build.
pub const MKXPZ_APP_NAME: &str = "Z-universal.app";

const GREENWORKS_MARKERS: [&str; 2] = ["greenworks.js", "greenworks.node"];

/// Written next to a finished install so listings can report where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallMetadata {
    pub family: FamilyId,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_key: Option<PlatformKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub source: InstallSource,
    pub installed_at: DateTime<Utc>,
    /// Family-specific facts (release asset, workflow run, commit).
    #[serde(flatten)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl InstallMetadata {
    pub fn new(family: FamilyId, version: impl Into<String>, source: InstallSource) -> Self {
        Self {
            family,
            version: version.into(),
            platform_key: None,
            variant: None,
            source,
            installed_at: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }
}

pub fn write_install_metadata(install_dir: &Path, meta: &InstallMetadata) -> Result<(), StoreError> {
    write_json_atomic(&install_dir.join(INSTALL_METADATA_FILE), meta)
}

/// Read the install record; unreadable or missing records are `None`.
pub fn read_install_metadata(install_dir: &Path) -> Option<InstallMetadata> {
    let raw = fs::read_to_string(install_dir.join(INSTALL_METADATA_FILE)).ok()?;
    match serde_json::from_str(&raw) {
        Ok(meta) => Some(meta),
        Err(e) => {
            debug!("ignoring bad install record in {}: {e}", install_dir.display());
            None
        }
    }
}

pub fn has_greenworks_marker(dir: &Path) -> bool {
    GREENWORKS_MARKERS.iter().any(|m| dir.join(m).exists())
}

/// First `*.app` directory under `dir`, preferring `preferred` when present.
pub fn find_app_bundle(dir: &Path, preferred: Option<&str>) -> Option<PathBuf> {
    let mut apps: Vec<String> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.to_ascii_lowercase().ends_with(".app"))
        .collect();
    if apps.is_empty() {
        return None;
    }
    if let Some(pref) = preferred {
        if apps.iter().any(|a| a == pref) {
            return Some(dir.join(pref));
        }
    }
    apps.sort();
    Some(dir.join(&apps[0]))
}

fn subdirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Discovery and removal of installed runtimes.
pub struct InstallStore {
    layout: DataLayout,
}

impl InstallStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// The runtime at its canonical path, if that path looks fully installed.
    pub fn runtime_at(
        &self,
        family: FamilyId,
        version: &str,
        platform_key: Option<&PlatformKey>,
        variant: Option<&str>,
    ) -> Option<InstalledRuntime> {
        let install_dir = self.layout.install_dir(family, version, platform_key, variant);
        let executable_path = match family {
            FamilyId::Nwjs => {
                let exe = DataLayout::nwjs_executable(&install_dir);
                if !exe.is_file() {
                    return None;
                }
                Some(exe)
            }
            FamilyId::Greenworks => {
                if !has_greenworks_marker(&install_dir) && read_install_metadata(&install_dir).is_none()
                {
                    return None;
                }
                None
            }
            FamilyId::Mkxpz => Some(find_app_bundle(&install_dir, Some(MKXPZ_APP_NAME))?),
        };
        let source = read_install_metadata(&install_dir).map_or(InstallSource::Unknown, |m| m.source);
        Some(InstalledRuntime {
            version: version.to_owned(),
            platform_key: platform_key.cloned(),
            variant: variant.map(str::to_owned),
            install_dir,
            executable_path,
            source,
        })
    }

    /// Every complete install of `family`, newest first.
    pub fn list(&self, family: FamilyId) -> Vec<InstalledRuntime> {
        let descriptor = family.descriptor();
        let family_dir = self.layout.family_dir(family);
        let mut out = Vec::new();
        for version in subdirs(&family_dir) {
            if !is_valid_version(descriptor, &version) {
                continue;
            }
            if descriptor.has_platforms {
                let version_dir = family_dir.join(&version);
                for key in subdirs(&version_dir) {
                    let key = PlatformKey::new(key);
                    for variant in subdirs(&version_dir.join(key.as_str())) {
                        if !descriptor.variants.contains(&variant.as_str()) {
                            continue;
                        }
                        out.extend(self.runtime_at(family, &version, Some(&key), Some(&variant)));
                    }
                }
            } else {
                out.extend(self.runtime_at(family, &version, None, None));
            }
        }
        out.sort_by(|a, b| {
            compare_versions(descriptor.grammar, &b.version, &a.version)
                .then_with(|| a.signature().cmp(&b.signature()))
        });
        out.dedup_by(|a, b| a.install_dir == b.install_dir);
        out
    }

    /// Remove an install directory that must sit inside the family's root.
    pub fn remove_dir(&self, family: FamilyId, install_dir: &Path) -> Result<(), StoreError> {
        let root = self.layout.family_dir(family);
        let escapes = install_dir
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !install_dir.starts_with(&root) || install_dir == root {
            return Err(StoreError::OutsideRoot {
                path: install_dir.to_path_buf(),
                root,
            });
        }
        force_remove(install_dir);
        prune_empty_parents(install_dir, &root);
        debug!("removed {family} install {}", install_dir.display());
        Ok(())
    }
}

/// Drop now-empty `<version>/<platform>` parents left behind by a removal.
fn prune_empty_parents(removed: &Path, stop: &Path) {
    let mut cur = removed.parent();
    while let Some(dir) = cur {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
        cur = dir.parent();
    }
}
