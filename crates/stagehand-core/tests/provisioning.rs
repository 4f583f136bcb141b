//! Provisioning against a local HTTP server standing in for the NW.js
//! distribution site and the GitHub API.

use serde_json::json;
use stagehand_core::{CoreError, ProgressEvent, ProvisioningService, StagehandConfig, UninstallTarget};
use stagehand_remote::testing::{Reply, TestServer};
use stagehand_remote::RemoteConfig;
use stagehand_schema::{CatalogStatus, FamilyId, HostArch, InstallSource, SettingsAction};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, OnceLock};
use std::time::Duration;
use zip::write::SimpleFileOptions;

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zw = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        zw.start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
            .unwrap();
        zw.write_all(body).unwrap();
    }
    zw.finish().unwrap().into_inner()
}

fn nwjs_zip(version: &str, key: &str) -> Vec<u8> {
    let exe = format!("nwjs-sdk-v{version}-{key}/nwjs.app/Contents/MacOS/nwjs");
    zip_bytes(&[(exe.as_str(), b"#!/bin/sh\n")])
}

fn nwjs_path(version: &str, key: &str) -> String {
    format!("/v{version}/nwjs-sdk-v{version}-{key}.zip")
}

fn config(data: &Path, server: &TestServer) -> StagehandConfig {
    let mut config = StagehandConfig::with_data_dir(data);
    config.remote = RemoteConfig::new(&server.url).with_github_api(&server.url);
    config
}

fn service(data: &Path, server: &TestServer, host: HostArch) -> ProvisioningService {
    ProvisioningService::with_host(config(data, server), host)
}

fn staging_entries(svc: &ProvisioningService) -> usize {
    fs::read_dir(svc.layout().staging_dir()).map_or(0, Iterator::count)
}

#[test]
fn install_then_reinstall_hits_network_once() {
    let path = nwjs_path("0.80.0", "osx-x64");
    let body = nwjs_zip("0.80.0", "osx-x64");
    let route = path.clone();
    let server = TestServer::start(move |p| {
        if p == route {
            Reply::ok(body.clone())
        } else {
            Reply::status(404)
        }
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let first = svc.install(FamilyId::Nwjs, "0.80.0", None, None).unwrap();
    assert!(first.runtime.executable_path.as_ref().unwrap().is_file());
    assert!(matches!(first.runtime.source, InstallSource::Download { .. }));
    assert_eq!(staging_entries(&svc), 0);

    let second = svc.install(FamilyId::Nwjs, "v0.80.0", Some("normal"), None).unwrap();
    assert_eq!(second.runtime.install_dir, first.runtime.install_dir);
    assert_eq!(server.hits(&path), 1);

    // First install of a family becomes its default.
    let settings = svc.family_settings(FamilyId::Nwjs).unwrap();
    assert_eq!(settings.default_version.as_deref(), Some("0.80.0"));
}

#[test]
fn concurrent_installs_of_one_version_share_a_download() {
    let path = nwjs_path("0.81.0", "osx-x64");
    let body = nwjs_zip("0.81.0", "osx-x64");
    let route = path.clone();
    let server = TestServer::start(move |p| {
        if p == route {
            Reply::ok(body.clone()).with_delay(Duration::from_millis(300))
        } else {
            Reply::status(404)
        }
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let dirs: Vec<PathBuf> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| svc.install(FamilyId::Nwjs, "0.81.0", None, None)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().runtime.install_dir)
            .collect()
    });
    assert!(dirs.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(server.hits(&path), 1);
    assert!(svc.installing(FamilyId::Nwjs).is_none());
}

#[test]
fn arm64_falls_through_to_x64_build_on_404() {
    let x64 = nwjs_path("0.82.0", "osx-x64");
    let body = nwjs_zip("0.82.0", "osx-x64");
    let route = x64.clone();
    let server = TestServer::start(move |p| {
        if p == route {
            Reply::ok(body.clone())
        } else {
            Reply::status(404)
        }
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::Arm64);

    let out = svc.install(FamilyId::Nwjs, "0.82.0", None, None).unwrap();
    assert_eq!(out.runtime.platform_key.as_ref().unwrap().as_str(), "osx-x64");
    assert_eq!(server.hits(&nwjs_path("0.82.0", "osx-arm64")), 1);
    assert_eq!(server.hits(&x64), 1);
}

#[test]
fn progress_events_arrive_in_order() {
    let path = nwjs_path("0.80.0", "osx-x64");
    let body = nwjs_zip("0.80.0", "osx-x64");
    let server = TestServer::start(move |p| {
        if p == path {
            Reply::ok(body.clone())
        } else {
            Reply::status(404)
        }
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let (tx, rx) = mpsc::channel();
    let out = svc.install(FamilyId::Nwjs, "0.80.0", None, Some(tx)).unwrap();
    let events: Vec<ProgressEvent> = rx.try_iter().collect();

    assert!(matches!(events.first(), Some(ProgressEvent::Resolving { version }) if version == "0.80.0"));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Downloading { .. })));
    let extracting = events.iter().position(|e| *e == ProgressEvent::Extracting).unwrap();
    let last_download = events
        .iter()
        .rposition(|e| matches!(e, ProgressEvent::Downloading { .. }))
        .unwrap();
    assert!(last_download < extracting);
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Installed {
            install_dir: out.runtime.install_dir
        })
    );
}

#[test]
fn redirect_loop_fails_without_leaving_staging() {
    let server = TestServer::start(|p| Reply::redirect(p));
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), &server);
    cfg.max_redirects = 3;
    let svc = ProvisioningService::with_host(cfg, HostArch::X64);

    let err = svc.install(FamilyId::Nwjs, "0.80.0", None, None).unwrap_err();
    assert!(matches!(err.root(), CoreError::DownloadFailed { .. }), "{err}");
    assert_eq!(server.hits(&nwjs_path("0.80.0", "osx-x64")), 4);
    assert_eq!(staging_entries(&svc), 0);
    assert!(svc.list_installed(FamilyId::Nwjs).is_empty());

    let state = svc.installing(FamilyId::Nwjs).unwrap();
    assert!(state.error.is_some());
}

#[test]
fn broken_archive_is_an_extraction_failure() {
    let server = TestServer::start(|_| Reply::ok(b"PK\x03\x04 definitely not a zip".to_vec()));
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let err = svc.install(FamilyId::Nwjs, "0.80.0", None, None).unwrap_err();
    assert!(matches!(err.root(), CoreError::ExtractionFailed { .. }), "{err}");
    assert_eq!(staging_entries(&svc), 0);
}

#[test]
fn invalid_version_never_touches_network() {
    let server = TestServer::start(|_| Reply::status(500));
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let err = svc.install(FamilyId::Nwjs, "0.80", None, None).unwrap_err();
    assert!(err.is_usage());
    let err = svc.install(FamilyId::Nwjs, "0.80.0", Some("mono"), None).unwrap_err();
    assert!(err.is_usage());
    assert_eq!(server.total_hits(), 0);
}

#[test]
fn catalog_is_cached_within_ttl() {
    let server = TestServer::start(|p| match p {
        "/versions.json" => Reply::json(&json!(["v0.79.0", "0.81.0", "junk", "0.80.0"])),
        _ => Reply::status(404),
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let state = svc.refresh_catalog(FamilyId::Nwjs, false).unwrap();
    assert_eq!(state.status, CatalogStatus::Success);
    assert_eq!(state.versions, vec!["0.81.0", "0.80.0", "0.79.0"]);
    assert!(state.source.unwrap().ends_with("/versions.json"));

    svc.refresh_catalog(FamilyId::Nwjs, false).unwrap();
    assert_eq!(server.hits("/versions.json"), 1);
    svc.refresh_catalog(FamilyId::Nwjs, true).unwrap();
    assert_eq!(server.hits("/versions.json"), 2);
}

#[test]
fn concurrent_catalog_refreshes_share_one_fetch() {
    let server = TestServer::start(|p| match p {
        "/versions.json" => {
            Reply::json(&json!(["0.80.0"])).with_delay(Duration::from_millis(300))
        }
        _ => Reply::status(404),
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| svc.refresh_catalog(FamilyId::Nwjs, true)))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().unwrap().versions, vec!["0.80.0"]);
        }
    });
    assert_eq!(server.hits("/versions.json"), 1);
}

#[test]
fn failed_catalog_falls_through_sources_then_records_error() {
    let server = TestServer::start(|p| match p {
        "/versions.json" => Reply::status(500),
        "/index.json" => Reply::json(&json!({"data": []})),
        "/" => Reply::ok(r#"<a href="v0.83.0/">v0.83.0</a>"#).with_header("Content-Type", "text/html"),
        _ => Reply::status(404),
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);
    let state = svc.refresh_catalog(FamilyId::Nwjs, false).unwrap();
    assert_eq!(state.versions, vec!["0.83.0"]);

    let dead = TestServer::start(|_| Reply::status(503));
    let svc = service(dir.path(), &dead, HostArch::X64);
    assert!(svc.refresh_catalog(FamilyId::Nwjs, false).is_err());
    let state = svc.catalog(FamilyId::Nwjs);
    assert_eq!(state.status, CatalogStatus::Error);
    assert!(state.versions.is_empty());
}

#[test]
fn update_flag_follows_catalog_and_default() {
    let server = TestServer::start(|p| match p {
        "/versions.json" => Reply::json(&json!(["0.81.0", "0.80.0"])),
        _ => Reply::status(404),
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);
    svc.apply_settings_action(
        FamilyId::Nwjs,
        &SettingsAction::SetDefault {
            version: "0.80.0".to_owned(),
            variant: None,
        },
    )
    .unwrap();
    svc.refresh_catalog(FamilyId::Nwjs, false).unwrap();

    let report = svc.state_report(FamilyId::Nwjs).unwrap();
    assert_eq!(report.catalog.latest_available_version.as_deref(), Some("0.81.0"));
    assert!(report.catalog.update_available);
}

#[test]
fn uninstall_reconciles_default_and_reports_missing() {
    let server = TestServer::start(|p| {
        for v in ["0.79.0", "0.80.0"] {
            if p == nwjs_path(v, "osx-x64") {
                return Reply::ok(nwjs_zip(v, "osx-x64"));
            }
        }
        Reply::status(404)
    });
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);
    svc.install(FamilyId::Nwjs, "0.79.0", None, None).unwrap();
    svc.install(FamilyId::Nwjs, "0.80.0", None, None).unwrap();
    assert_eq!(
        svc.family_settings(FamilyId::Nwjs).unwrap().default_version.as_deref(),
        Some("0.80.0")
    );

    let target = UninstallTarget::Version {
        version: "0.80.0".to_owned(),
        platform_key: None,
        variant: None,
    };
    svc.uninstall(FamilyId::Nwjs, &target).unwrap();
    assert_eq!(
        svc.family_settings(FamilyId::Nwjs).unwrap().default_version.as_deref(),
        Some("0.79.0")
    );
    assert!(svc.uninstall(FamilyId::Nwjs, &target).unwrap_err().is_not_installed());

    let last = svc.list_installed(FamilyId::Nwjs).remove(0);
    svc.uninstall(FamilyId::Nwjs, &UninstallTarget::Dir(last.install_dir)).unwrap();
    assert_eq!(svc.family_settings(FamilyId::Nwjs).unwrap().default_version, None);
}

fn mkxpz_bundle(root: &Path, version: &str) -> PathBuf {
    let dir = root.join(version);
    fs::create_dir_all(dir.join("Z-universal.app/Contents/MacOS")).unwrap();
    fs::write(dir.join("Z-universal.app/Contents/MacOS/Z-universal"), "").unwrap();
    dir
}

#[test]
fn mkxpz_falls_back_to_bundled_build() {
    let server = TestServer::start(|_| Reply::status(500));
    let dir = tempfile::tempdir().unwrap();
    let bundled = dir.path().join("bundled");
    let bundled_version = "2024-01-02T03-04-05Z_abc123";
    let source = mkxpz_bundle(&bundled, bundled_version);

    let mut cfg = config(&dir.path().join("data"), &server);
    cfg.mkxpz.bundled_dir = Some(bundled.clone());
    let svc = ProvisioningService::with_host(cfg, HostArch::X64);

    let out = svc
        .install(FamilyId::Mkxpz, "2024-05-06T07-08-09Z_def456", None, None)
        .unwrap();
    assert!(out.used_fallback);
    assert_eq!(out.runtime.version, bundled_version);
    assert_eq!(out.runtime.source, InstallSource::Bundled);
    assert!(out.runtime.install_dir.starts_with(svc.layout().runtimes_dir()));
    assert!(source.join("Z-universal.app").is_dir());

    // The bundled tree itself cannot be uninstalled.
    let err = svc
        .uninstall(FamilyId::Mkxpz, &UninstallTarget::Dir(source.clone()))
        .unwrap_err();
    assert!(matches!(err, CoreError::BundledRuntime(_)));
    assert!(source.exists());
}

#[test]
fn mkxpz_listing_puts_newer_bundled_build_first() {
    let server = TestServer::start(|_| Reply::status(500));
    let dir = tempfile::tempdir().unwrap();
    let bundled = dir.path().join("bundled");
    let older = "2024-01-02T03-04-05Z_abc123";
    let newer = "2025-06-07T08-09-10Z_fed987";
    mkxpz_bundle(&bundled, older);

    let mut cfg = config(&dir.path().join("data"), &server);
    cfg.mkxpz.bundled_dir = Some(bundled.clone());
    let svc = ProvisioningService::with_host(cfg, HostArch::X64);
    svc.install(FamilyId::Mkxpz, "2024-05-06T07-08-09Z_def456", None, None)
        .unwrap();

    // A newer build shipped with the app after the first copy was taken.
    mkxpz_bundle(&bundled, newer);
    let versions: Vec<String> = svc
        .list_installed(FamilyId::Mkxpz)
        .into_iter()
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec![newer.to_owned(), older.to_owned()]);
}

#[test]
fn mkxpz_without_bundle_surfaces_network_error() {
    let server = TestServer::start(|_| Reply::status(500));
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);
    let err = svc
        .install(FamilyId::Mkxpz, "2024-05-06T07-08-09Z_def456", None, None)
        .unwrap_err();
    assert!(matches!(err.root(), CoreError::DownloadFailed { .. }), "{err}");
}

#[test]
fn mkxpz_catalog_and_install_from_actions_artifact() {
    let artifact = zip_bytes(&[(
        "mkxp-z.zip",
        &zip_bytes(&[("Z-universal.app/Contents/MacOS/Z-universal", b"")]),
    )]);
    let base: Arc<OnceLock<String>> = Arc::default();
    let own = Arc::clone(&base);
    let server = TestServer::start(move |p| {
        let url = own.get().cloned().unwrap_or_default();
        let path = p.split('?').next().unwrap_or_default();
        match path {
            "/repos/mkxp-z/mkxp-z/actions/workflows/autobuild.yml/runs" => Reply::json(&json!({
                "workflow_runs": [{
                    "id": 42,
                    "head_sha": "abc123",
                    "run_started_at": "2024-03-04T05:06:07Z"
                }]
            })),
            "/repos/mkxp-z/mkxp-z/actions/runs/42/artifacts" => Reply::json(&json!({
                "artifacts": [
                    {"id": 1, "name": "linux-build", "archive_download_url": format!("{url}/dl/1"), "expired": false},
                    {"id": 2, "name": "macos-universal", "archive_download_url": format!("{url}/dl/2"), "expired": false}
                ]
            })),
            "/dl/2" => Reply::ok(artifact.clone()),
            _ => Reply::status(404),
        }
    });
    base.set(server.url.clone()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let state = svc.refresh_catalog(FamilyId::Mkxpz, false).unwrap();
    let version = "2024-03-04T05-06-07Z_abc123";
    assert_eq!(state.versions, vec![version]);

    let out = svc.install(FamilyId::Mkxpz, version, None, None).unwrap();
    assert!(!out.used_fallback);
    assert_eq!(out.runtime.source, InstallSource::GithubActions { run_id: 42 });
    assert!(out.runtime.executable_path.unwrap().ends_with("Z-universal.app"));
}

#[test]
fn greenworks_install_from_release_asset() {
    let asset = zip_bytes(&[("greenworks-v0.15.0-nw-v0.80.0-osx/greenworks.js", b"module.exports = {};")]);
    let base: Arc<OnceLock<String>> = Arc::default();
    let own = Arc::clone(&base);
    let server = TestServer::start(move |p| {
        let url = own.get().cloned().unwrap_or_default();
        let path = p.split('?').next().unwrap_or_default();
        match path {
            "/repos/greenheartgames/greenworks/releases" => Reply::json(&json!([{
                "tag_name": "v0.15.0",
                "published_at": "2023-01-01T00:00:00Z",
                "draft": false,
                "prerelease": false,
                "assets": [
                    {"name": "greenworks-v0.15.0-nw-v0.80.0-win.zip", "browser_download_url": format!("{url}/gw/win.zip")},
                    {"name": "greenworks-v0.15.0-nw-v0.80.0-osx.zip", "browser_download_url": format!("{url}/gw/osx.zip")}
                ]
            }])),
            "/gw/osx.zip" => Reply::ok(asset.clone()),
            _ => Reply::status(404),
        }
    });
    base.set(server.url.clone()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), &server, HostArch::X64);

    let state = svc.refresh_catalog(FamilyId::Greenworks, false).unwrap();
    assert_eq!(state.versions, vec!["0.80.0"]);

    let out = svc.install(FamilyId::Greenworks, "0.80.0", None, None).unwrap();
    assert!(out.runtime.install_dir.join("greenworks.js").is_file());
    assert!(out.runtime.executable_path.is_none());

    let err = svc
        .ensure_installed(FamilyId::Greenworks, "0.81.0", None, false, None)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Greenworks for NW.js v0.81.0 is not installed. Install it from Runtimes."
    );
}
