//! Wrapping and launching guests against runtimes installed on disk.

use stagehand_core::{CoreError, GuestLaunch, ProvisioningService, StagehandConfig};
use stagehand_runtime::GuestContentEntry;
use stagehand_schema::{stable_id, FamilyId, HostArch, PlatformKey, SettingsAction};
use stagehand_store::DataLayout;
use std::fs;
use std::path::{Path, PathBuf};

fn service(data: &Path) -> ProvisioningService {
    let mut config = StagehandConfig::with_data_dir(data);
    config.remote = stagehand_remote::RemoteConfig::new("http://127.0.0.1:9");
    ProvisioningService::with_host(config, HostArch::X64)
}

fn guest(root: &Path) -> GuestContentEntry {
    fs::create_dir_all(root.join("img")).unwrap();
    fs::write(root.join("index.html"), "<html></html>").unwrap();
    fs::write(root.join("img/a.png"), "png").unwrap();
    fs::write(root.join("package.json"), r#"{"name":"guest","main":"index.html"}"#).unwrap();
    GuestContentEntry::new(root, root, root.join("index.html"))
}

fn fake_nwjs(svc: &ProvisioningService, version: &str) -> PathBuf {
    let dir = svc
        .layout()
        .install_dir(FamilyId::Nwjs, version, Some(&PlatformKey::new("osx-x64")), Some("sdk"));
    let exe = DataLayout::nwjs_executable(&dir);
    fs::create_dir_all(exe.parent().unwrap()).unwrap();
    fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir
}

fn fake_greenworks(svc: &ProvisioningService, version: &str) -> PathBuf {
    let dir = svc.layout().install_dir(FamilyId::Greenworks, version, None, None);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("greenworks.js"), format!("// sdk {version}")).unwrap();
    fs::write(dir.join("greenworks.node"), "binary").unwrap();
    dir
}

#[cfg(unix)]
#[test]
fn launch_spawns_runtime_with_per_guest_profile() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    fake_nwjs(&svc, "0.80.0");
    let entry = guest(&dir.path().join("game"));

    let mut request = GuestLaunch::new("rpgmaker", entry.clone());
    request.version = Some("0.80.0".to_owned());
    let report = svc.prepare_launch(&request, None).unwrap();

    assert!(report.process.pid > 0);
    let expected_profile = svc.layout().profile_dir(
        "rpgmaker",
        stable_id(&entry.game_path).as_str(),
        "0.80.0-osx-x64-sdk",
    );
    assert_eq!(report.process.profile_dir, expected_profile);
    assert!(expected_profile.is_dir());
    assert_eq!(
        report.process.args,
        vec![
            format!("--user-data-dir={}", expected_profile.display()),
            report.wrapped.wrapper.path.display().to_string(),
        ]
    );
    assert!(report.wrapped.wrapper.path.join("package.json").is_file());
    assert!(report.wrapped.sdk_targets.is_empty());
}

#[test]
fn launch_without_install_permission_reports_missing_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let mut request = GuestLaunch::new("rpgmaker", guest(&dir.path().join("game")));
    request.version = Some("0.90.0".to_owned());

    let err = svc.prepare_launch(&request, None).unwrap_err();
    assert!(err.is_not_installed());
    assert_eq!(
        err.to_string(),
        "NW.js runtime v0.90.0 is not installed. Install it from Runtimes."
    );
}

#[test]
fn launch_version_falls_back_to_settings_then_family_default() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let request = GuestLaunch::new("rpgmaker", guest(&dir.path().join("game")));

    let (version, _) = svc.resolve_launch_version(&request).unwrap();
    assert_eq!(version, "0.107.0");

    svc.apply_settings_action(
        FamilyId::Nwjs,
        &SettingsAction::SetDefault {
            version: "0.80.0".to_owned(),
            variant: Some("normal".to_owned()),
        },
    )
    .unwrap();
    let (version, variant) = svc.resolve_launch_version(&request).unwrap();
    assert_eq!(version, "0.80.0");
    assert_eq!(variant.as_deref(), Some("sdk"));
}

#[test]
fn sdk_guest_requires_greenworks() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let root = dir.path().join("game");
    let entry = guest(&root);
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib/greenworks.js"), "// stub").unwrap();

    let request = GuestLaunch::new("rpgmaker", entry);
    let err = svc.wrap(&request).unwrap_err();
    assert!(matches!(err, CoreError::NotInstalled(_)));
    assert_eq!(
        err.to_string(),
        "Greenworks is required but no Greenworks runtime is installed. Install it from Runtimes."
    );
}

#[test]
fn sdk_overlay_copies_configured_greenworks_without_touching_guest() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let root = dir.path().join("game");
    let entry = guest(&root);
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib/greenworks.js"), "// stub").unwrap();
    fs::write(root.join("lib/other.js"), "// keep").unwrap();
    fake_greenworks(&svc, "0.79.0");
    fake_greenworks(&svc, "0.81.0");
    svc.apply_settings_action(
        FamilyId::Nwjs,
        &SettingsAction::SetGreenworksDefault(Some("0.79.0".to_owned())),
    )
    .unwrap();

    let wrapped = svc.wrap(&GuestLaunch::new("rpgmaker", entry)).unwrap();
    assert_eq!(wrapped.greenworks.as_ref().unwrap().version, "0.79.0");
    assert_eq!(wrapped.sdk_targets, vec![root.join("lib")]);

    let lib = wrapped.wrapper.path.join("lib");
    let overlaid = lib.join("greenworks.js");
    assert!(!fs::symlink_metadata(&overlaid).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_to_string(&overlaid).unwrap(), "// sdk 0.79.0");
    assert!(lib.join("greenworks.node").is_file());
    assert!(lib.join("other.js").exists());
    assert_eq!(fs::read_to_string(root.join("lib/greenworks.js")).unwrap(), "// stub");
}

#[test]
fn sdk_overlay_uses_newest_when_configured_version_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let root = dir.path().join("game");
    let entry = guest(&root);
    fs::write(root.join("greenworks.node"), "stub").unwrap();
    fake_greenworks(&svc, "0.79.0");
    fake_greenworks(&svc, "0.81.0");
    svc.apply_settings_action(
        FamilyId::Nwjs,
        &SettingsAction::SetGreenworksDefault(Some("0.70.0".to_owned())),
    )
    .unwrap();

    let wrapped = svc.wrap(&GuestLaunch::new("rpgmaker", entry)).unwrap();
    assert_eq!(wrapped.greenworks.unwrap().version, "0.81.0");
    assert_eq!(
        fs::read_to_string(wrapped.wrapper.path.join("greenworks.js")).unwrap(),
        "// sdk 0.81.0"
    );
}

#[test]
fn cleanup_removes_wrappers_profiles_and_app_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let root = dir.path().join("game");
    let entry = guest(&root);
    let wrapped = svc.wrap(&GuestLaunch::new("rpgmaker", entry.clone())).unwrap();

    let id = stable_id(&entry.game_path);
    let layout = svc.layout();
    let minted = layout.wrappers_dir("rpgmaker").join(format!("{id}-1700000000000"));
    fs::create_dir_all(&minted).unwrap();
    let profile = layout.profile_dir("rpgmaker", id.as_str(), "0.80.0-osx-x64-sdk");
    fs::create_dir_all(&profile).unwrap();
    let app = layout.app_bundle("rpgmaker", id.as_str());
    fs::create_dir_all(&app).unwrap();
    let unrelated = layout.wrappers_dir("rpgmaker").join("someone-else");
    fs::create_dir_all(&unrelated).unwrap();

    let report = svc.cleanup_guest_data("rpgmaker", &entry.game_path).unwrap();
    assert_eq!(report.removed.len(), 4);
    assert!(!wrapped.wrapper.path.exists());
    assert!(!minted.exists());
    assert!(!profile.exists());
    assert!(!app.exists());
    assert!(unrelated.exists());
    assert!(root.join("index.html").is_file());

    let again = svc.cleanup_guest_data("rpgmaker", &entry.game_path).unwrap();
    assert!(again.removed.is_empty());
}

fn sdk_guest(root: &Path) -> GuestContentEntry {
    let entry = guest(root);
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib/greenworks.js"), "// stub").unwrap();
    entry
}

#[cfg(unix)]
#[test]
fn greenworks_guest_launches_on_the_nwjs_version_it_targets() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    fake_nwjs(&svc, "0.80.0");
    fake_greenworks(&svc, "0.80.0");
    let request = GuestLaunch::new("rpgmaker", sdk_guest(&dir.path().join("game")));

    let report = svc.prepare_launch(&request, None).unwrap();
    assert_eq!(report.runtime.version, "0.80.0");
    assert_eq!(report.wrapped.greenworks.as_ref().unwrap().version, "0.80.0");
    assert!(report.process.profile_dir.ends_with("0.80.0-osx-x64-sdk"));
    assert_eq!(
        fs::read_to_string(report.wrapped.wrapper.path.join("lib/greenworks.js")).unwrap(),
        "// sdk 0.80.0"
    );
}

#[test]
fn greenworks_pin_overrides_settings_default_but_not_explicit_version() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    fake_greenworks(&svc, "0.81.0");
    svc.apply_settings_action(
        FamilyId::Nwjs,
        &SettingsAction::SetDefault {
            version: "0.79.0".to_owned(),
            variant: None,
        },
    )
    .unwrap();
    let mut request = GuestLaunch::new("rpgmaker", sdk_guest(&dir.path().join("game")));

    let err = svc.prepare_launch(&request, None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "NW.js runtime v0.81.0 is not installed. Install it from Runtimes."
    );

    request.version = Some("0.90.0".to_owned());
    let err = svc.prepare_launch(&request, None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "NW.js runtime v0.90.0 is not installed. Install it from Runtimes."
    );
}

#[test]
fn greenworks_guest_without_sdk_fails_before_runtime_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    fake_nwjs(&svc, "0.80.0");
    let request = GuestLaunch::new("rpgmaker", sdk_guest(&dir.path().join("game")));

    let err = svc.prepare_launch(&request, None).unwrap_err();
    assert!(err.to_string().starts_with("Greenworks is required"));
}

#[test]
fn cleanup_covers_minted_wrappers_and_every_runtime_profile() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir.path().join("data"));
    let root = dir.path().join("game");
    let entry = guest(&root);
    let first = svc.wrap(&GuestLaunch::new("rpgmaker", entry.clone())).unwrap();

    // Same identity, different content root: the builder mints a sibling.
    let moved_root = root.join("img");
    fs::write(moved_root.join("index.html"), "<html></html>").unwrap();
    let moved = GuestContentEntry::new(&root, &moved_root, moved_root.join("index.html"));
    let minted = svc.wrap(&GuestLaunch::new("rpgmaker", moved)).unwrap();
    assert!(minted.wrapper.minted);
    assert_ne!(minted.wrapper.path, first.wrapper.path);

    let id = stable_id(&entry.game_path);
    let layout = svc.layout();
    let profiles = [
        layout.profile_dir("rpgmaker", id.as_str(), "0.80.0-osx-x64-sdk"),
        layout.profile_dir("rpgmaker", id.as_str(), "0.81.0-osx-arm64-sdk"),
    ];
    for p in &profiles {
        fs::create_dir_all(p).unwrap();
        fs::write(p.join("Preferences"), "{}").unwrap();
    }
    let other_profile = layout.profile_dir("rpgmaker", "someone-else", "0.80.0-osx-x64-sdk");
    fs::create_dir_all(&other_profile).unwrap();

    let report = svc.cleanup_guest_data("rpgmaker", &entry.game_path).unwrap();
    assert!(report.removed.contains(&first.wrapper.path));
    assert!(report.removed.contains(&minted.wrapper.path));
    assert!(!first.wrapper.path.exists());
    assert!(!minted.wrapper.path.exists());
    for p in &profiles {
        assert!(!p.exists(), "{}", p.display());
    }
    assert!(other_profile.exists());
}
