//! Keeping the default-version preference consistent with what is installed.
//!
//! These are pure functions over a [`Settings`] value; the service loads,
//! applies and saves.

use stagehand_schema::{
    compare_versions, normalize_variant, normalize_version, FamilyId, InstalledRuntime, SchemaError,
    Settings, SettingsAction,
};
use std::cmp::Ordering;

/// Promote `installed` to default when it is newer than the current default.
pub fn after_install(settings: &Settings, family: FamilyId, installed: &InstalledRuntime) -> Settings {
    let grammar = family.descriptor().grammar;
    let current = settings.family(family);
    let newer = match current.default_version.as_deref() {
        Some(d) => compare_versions(grammar, &installed.version, d) == Ordering::Greater,
        None => true,
    };
    if !newer {
        return settings.clone();
    }
    let mut next = settings.clone();
    let entry = next.family_mut(family);
    entry.default_version = Some(installed.version.clone());
    if installed.variant.is_some() {
        entry.default_variant.clone_from(&installed.variant);
    }
    next
}

/// Re-point the default at the newest remaining install when it disappeared.
///
/// With nothing installed the default is cleared.
pub fn after_uninstall(settings: &Settings, family: FamilyId, installed: &[InstalledRuntime]) -> Settings {
    let grammar = family.descriptor().grammar;
    let current = settings.family(family);
    let still_present = current
        .default_version
        .as_deref()
        .is_some_and(|d| installed.iter().any(|r| r.version == d));
    if still_present {
        return settings.clone();
    }
    let newest = installed
        .iter()
        .max_by(|a, b| compare_versions(grammar, &a.version, &b.version));
    let mut next = settings.clone();
    let entry = next.family_mut(family);
    entry.default_version = newest.map(|r| r.version.clone());
    if let Some(variant) = newest.and_then(|r| r.variant.clone()) {
        entry.default_variant = Some(variant);
    }
    next
}

/// Apply a user-initiated change, validating any version it carries.
pub fn apply_action(settings: &Settings, family: FamilyId, action: &SettingsAction) -> Result<Settings, SchemaError> {
    let descriptor = family.descriptor();
    let mut next = settings.clone();
    let entry = next.family_mut(family);
    match action {
        SettingsAction::SetDefault { version, variant } => {
            entry.default_version = Some(normalize_version(descriptor, version)?);
            entry.default_variant = normalize_variant(descriptor, variant.as_deref())?;
        }
        SettingsAction::ClearDefault => entry.default_version = None,
        SettingsAction::SetGreenworksDefault(version) => {
            entry.greenworks_default_version = match version {
                Some(v) => Some(normalize_version(FamilyId::Greenworks.descriptor(), v)?),
                None => None,
            };
        }
        SettingsAction::SetProtections(on) => entry.enable_protections = *on,
        SettingsAction::SetCaseInsensitive(on) => entry.case_insensitive = *on,
        SettingsAction::SetUserScripts(on) => entry.enable_user_scripts = *on,
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_schema::{InstallSource, PlatformKey};
    use std::path::PathBuf;

    fn nwjs(version: &str) -> InstalledRuntime {
        InstalledRuntime {
            version: version.to_owned(),
            platform_key: Some(PlatformKey::new("osx-arm64")),
            variant: Some("sdk".to_owned()),
            install_dir: PathBuf::from(format!("/data/runtimes/nwjs/{version}/osx-arm64/sdk")),
            executable_path: None,
            source: InstallSource::Unknown,
        }
    }

    fn with_default(version: &str) -> Settings {
        let mut s = Settings::default();
        s.family_mut(FamilyId::Nwjs).default_version = Some(version.to_owned());
        s
    }

    #[test]
    fn missing_default_falls_back_to_newest_remaining() {
        let s = with_default("0.81.0");
        let installed = [nwjs("0.79.0"), nwjs("0.80.0")];
        let next = after_uninstall(&s, FamilyId::Nwjs, &installed);
        assert_eq!(next.family(FamilyId::Nwjs).default_version.as_deref(), Some("0.80.0"));
    }

    #[test]
    fn present_default_is_kept() {
        let s = with_default("0.79.0");
        let installed = [nwjs("0.79.0"), nwjs("0.80.0")];
        assert_eq!(after_uninstall(&s, FamilyId::Nwjs, &installed), s);
    }

    #[test]
    fn nothing_left_clears_default() {
        let s = with_default("0.81.0");
        let next = after_uninstall(&s, FamilyId::Nwjs, &[]);
        assert_eq!(next.family(FamilyId::Nwjs).default_version, None);
    }

    #[test]
    fn after_uninstall_is_idempotent() {
        let s = with_default("0.81.0");
        let installed = [nwjs("0.80.0")];
        let once = after_uninstall(&s, FamilyId::Nwjs, &installed);
        assert_eq!(after_uninstall(&once, FamilyId::Nwjs, &installed), once);
    }

    #[test]
    fn newer_install_becomes_default() {
        let s = with_default("0.80.0");
        let next = after_install(&s, FamilyId::Nwjs, &nwjs("0.100.0"));
        assert_eq!(next.family(FamilyId::Nwjs).default_version.as_deref(), Some("0.100.0"));
    }

    #[test]
    fn older_install_leaves_default() {
        let s = with_default("0.80.0");
        assert_eq!(after_install(&s, FamilyId::Nwjs, &nwjs("0.79.0")), s);
    }

    #[test]
    fn first_install_sets_default() {
        let next = after_install(&Settings::default(), FamilyId::Nwjs, &nwjs("0.80.0"));
        assert_eq!(next.family(FamilyId::Nwjs).default_version.as_deref(), Some("0.80.0"));
    }

    #[test]
    fn set_default_validates_and_normalizes() {
        let action = SettingsAction::SetDefault {
            version: "v0.90.0".to_owned(),
            variant: Some("normal".to_owned()),
        };
        let next = apply_action(&Settings::default(), FamilyId::Nwjs, &action).unwrap();
        let fam = next.family(FamilyId::Nwjs);
        assert_eq!(fam.default_version.as_deref(), Some("0.90.0"));
        assert_eq!(fam.default_variant.as_deref(), Some("sdk"));

        let bad = SettingsAction::SetDefault {
            version: "latest".to_owned(),
            variant: None,
        };
        assert!(apply_action(&Settings::default(), FamilyId::Nwjs, &bad).is_err());
    }

    #[test]
    fn toggles_apply() {
        let next = apply_action(&Settings::default(), FamilyId::Nwjs, &SettingsAction::SetProtections(false)).unwrap();
        assert!(!next.family(FamilyId::Nwjs).enable_protections);
    }
}
