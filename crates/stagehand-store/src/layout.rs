use crate::StoreError;
use stagehand_schema::{FamilyId, PlatformKey};
use std::fs;
use std::path::{Path, PathBuf};

/// Executable of an NW.js install, relative to its install dir.
pub const NWJS_EXECUTABLE: &str = "nwjs.app/Contents/MacOS/nwjs";

const SETTINGS_FILE: &str = "settings.json";

/// Directory layout of the Stagehand data root.
///
/// Install paths are a pure function of `(family, version, platform, variant)`,
/// so presence on disk is the existence check. Staging and lock directories
/// live under `runtimes/` so a staged tree can be renamed into place on the
/// same filesystem.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    #[inline]
    pub fn runtimes_dir(&self) -> PathBuf {
        self.root.join("runtimes")
    }

    #[inline]
    pub fn family_dir(&self, family: FamilyId) -> PathBuf {
        self.runtimes_dir().join(family.as_str())
    }

    /// Temporary download/extract area for in-progress installs.
    #[inline]
    pub fn staging_dir(&self) -> PathBuf {
        self.runtimes_dir().join(".staging")
    }

    #[inline]
    pub fn locks_dir(&self) -> PathBuf {
        self.runtimes_dir().join(".locks")
    }

    #[inline]
    pub fn family_lock(&self, family: FamilyId) -> PathBuf {
        self.locks_dir().join(format!("{family}.lock"))
    }

    /// `<runtimes>/<family>/<version>[/<platform>][/<variant>]`
    pub fn install_dir(
        &self,
        family: FamilyId,
        version: &str,
        platform_key: Option<&PlatformKey>,
        variant: Option<&str>,
    ) -> PathBuf {
        let mut dir = self.family_dir(family).join(version);
        if let Some(key) = platform_key {
            dir.push(key.as_str());
        }
        if let Some(variant) = variant {
            dir.push(variant);
        }
        dir
    }

    #[inline]
    pub fn nwjs_executable(install_dir: &Path) -> PathBuf {
        install_dir.join(NWJS_EXECUTABLE)
    }

    #[inline]
    pub fn module_nwjs_dir(&self, module_id: &str) -> PathBuf {
        self.root.join("modules").join(module_id).join("nwjs")
    }

    #[inline]
    pub fn wrappers_dir(&self, module_id: &str) -> PathBuf {
        self.module_nwjs_dir(module_id).join("wrappers")
    }

    #[inline]
    pub fn profiles_dir(&self, module_id: &str) -> PathBuf {
        self.module_nwjs_dir(module_id).join("profiles")
    }

    /// Persistent runtime profile of one guest under one runtime build.
    #[inline]
    pub fn profile_dir(&self, module_id: &str, guest_id: &str, signature: &str) -> PathBuf {
        self.profiles_dir(module_id).join(guest_id).join(signature)
    }

    #[inline]
    pub fn apps_dir(&self, module_id: &str) -> PathBuf {
        self.module_nwjs_dir(module_id).join("apps")
    }

    #[inline]
    pub fn app_bundle(&self, module_id: &str, guest_id: &str) -> PathBuf {
        self.apps_dir(module_id).join(format!("{guest_id}.app"))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.runtimes_dir())?;
        fs::create_dir_all(self.staging_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        Ok(())
    }
}

/// `$STAGEHAND_DATA_DIR`, else `$XDG_DATA_HOME/stagehand`, else `~/.local/share/stagehand`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STAGEHAND_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("stagehand");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/stagehand")
    } else {
        PathBuf::from("/tmp/stagehand")
    }
}
