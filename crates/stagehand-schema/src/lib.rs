//! Runtime family descriptors, version grammars, settings and status records for Stagehand.
//!
//! This crate is the schema layer: compile-time `RuntimeFamily` descriptors,
//! version normalization and ordering (`compare_versions`), host platform keys,
//! the persisted `Settings` document, the reported `CatalogState` and
//! `InstallState` records, and stable guest identity hashing (`stable_id`).

pub mod family;
pub mod identity;
pub mod platform;
pub mod settings;
pub mod status;
pub mod types;
pub mod version;

pub use family::{FamilyId, RuntimeFamily, VersionGrammar, GREENWORKS, MKXPZ, NWJS};
pub use identity::stable_id;
pub use platform::{normalize_variant, HostArch};
pub use settings::{FamilySettings, Settings, SettingsAction};
pub use status::{
    CatalogState, CatalogStatus, InstallSource, InstallState, InstallStatus, InstalledRuntime,
};
pub use types::{PlatformKey, StableId};
pub use version::{
    compare_versions, extract_semver, is_valid_version, normalize_version, parse_semver,
    parse_version_date, sanitize_segment, sort_desc, version_label,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown runtime family '{0}'")]
    UnknownFamily(String),
    #[error("Invalid {family} version: {input}")]
    InvalidVersion { family: &'static str, input: String },
    #[error("Invalid {family} variant: {input}")]
    InvalidVariant { family: &'static str, input: String },
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings parse error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_version_message_names_family() {
        let err = SchemaError::InvalidVersion {
            family: "NW.js",
            input: "abc".to_owned(),
        };
        assert_eq!(err.to_string(), "Invalid NW.js version: abc");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SchemaError = io.into();
        assert!(err.to_string().contains("gone"));
    }
}
