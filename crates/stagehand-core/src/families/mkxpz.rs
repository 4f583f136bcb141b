//! MKXP-Z builds from GitHub Actions artifacts, with a host-bundled fallback.

use super::{CatalogListing, Context, FamilyProvider};
use crate::concurrency::lock;
use crate::install::{
    commit, download_failed, extraction_failed, fetch_and_extract, Emit, InstallOutcome,
    InstallRequest, ProgressEvent, Staging,
};
use crate::CoreError;
use serde::Serialize;
use stagehand_remote::{extract_nested_zips, locate_root, GitHubApi, RemoteError};
use stagehand_schema::{
    compare_versions, is_valid_version, sanitize_segment, FamilyId, InstallSource, InstalledRuntime,
    VersionGrammar, MKXPZ,
};
use stagehand_store::{copy_dir_recursive, find_app_bundle, InstallMetadata, MKXPZ_APP_NAME};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// A runtime tree shipped with the host under `mkxpz.bundled_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundledRuntime {
    pub version: String,
    pub dir: PathBuf,
    pub app: PathBuf,
}

/// A catalog entry's download location.
#[derive(Debug, Clone)]
struct ArtifactRef {
    run_id: u64,
    artifact_id: u64,
    name: String,
    url: String,
    sha: String,
    date: String,
}

#[derive(Default)]
pub(crate) struct MkxpzProvider {
    artifacts: Mutex<BTreeMap<String, ArtifactRef>>,
}

/// Newest `<version>/<*.app>` entry under the bundled dir.
pub(crate) fn bundled_runtime(ctx: &Context) -> Option<BundledRuntime> {
    let root = ctx.mkxpz.bundled_dir.as_deref()?;
    let mut found: Vec<BundledRuntime> = fs::read_dir(root)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let version = entry.file_name().into_string().ok()?;
            if !is_valid_version(&MKXPZ, &version) {
                return None;
            }
            let dir = entry.path();
            let app = find_app_bundle(&dir, Some(MKXPZ_APP_NAME))?;
            Some(BundledRuntime { version, dir, app })
        })
        .collect();
    found.sort_by(|a, b| compare_versions(VersionGrammar::DateHash, &b.version, &a.version));
    found.into_iter().next()
}

fn bundled_as_installed(bundled: BundledRuntime) -> InstalledRuntime {
    InstalledRuntime {
        version: bundled.version,
        platform_key: None,
        variant: None,
        install_dir: bundled.dir,
        executable_path: Some(bundled.app),
        source: InstallSource::Bundled,
    }
}

fn run_date(run: &stagehand_remote::WorkflowRun) -> String {
    run.date()
        .map_or_else(|| "unknown-date".to_owned(), |d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

impl MkxpzProvider {
    fn api<'a>(ctx: &'a Context) -> GitHubApi<'a> {
        GitHubApi::new(&ctx.http, &ctx.remote.github_api_base, ctx.remote.github_token.clone())
    }

    /// Newest first: one matching artifact per successful run.
    fn list_builds(ctx: &Context) -> Result<Vec<(String, ArtifactRef)>, RemoteError> {
        let api = Self::api(ctx);
        let cfg = &ctx.mkxpz;
        let needle = cfg.artifact_needle.to_ascii_lowercase();
        let runs = api.list_runs(&cfg.repo, &cfg.workflow, &cfg.branch, cfg.max_runs)?;
        let mut builds = Vec::new();
        for run in runs {
            let artifacts = match api.list_artifacts(&cfg.repo, run.id) {
                Ok(a) => a,
                Err(e) => {
                    warn!("skipping MKXP-Z run {}: {e}", run.id);
                    continue;
                }
            };
            let Some(artifact) = artifacts
                .into_iter()
                .find(|a| !a.expired && a.name.to_ascii_lowercase().contains(&needle))
            else {
                debug!("run {} has no artifact matching '{needle}'", run.id);
                continue;
            };
            let date = run_date(&run);
            let sha = if run.head_sha.is_empty() {
                "unknown-sha".to_owned()
            } else {
                run.head_sha.clone()
            };
            let version = format!("{}_{}", sanitize_segment(&date), sanitize_segment(&sha));
            builds.push((
                version,
                ArtifactRef {
                    run_id: run.id,
                    artifact_id: artifact.id,
                    name: artifact.name,
                    url: artifact.archive_download_url,
                    sha,
                    date,
                },
            ));
        }
        builds.sort_by(|a, b| compare_versions(VersionGrammar::DateHash, &b.0, &a.0));
        builds.dedup_by(|a, b| a.0 == b.0);
        Ok(builds)
    }

    fn remember(&self, builds: &[(String, ArtifactRef)]) {
        let mut cache = lock(&self.artifacts);
        for (version, artifact) in builds {
            cache.insert(version.clone(), artifact.clone());
        }
    }

    fn artifact_for(&self, ctx: &Context, version: &str) -> Result<ArtifactRef, RemoteError> {
        if let Some(found) = lock(&self.artifacts).get(version).cloned() {
            return Ok(found);
        }
        let builds = Self::list_builds(ctx)?;
        self.remember(&builds);
        builds
            .into_iter()
            .find(|(v, _)| v == version)
            .map(|(_, a)| a)
            .ok_or_else(|| RemoteError::NotFound(format!("no MKXP-Z build {version}")))
    }

    fn install_artifact(ctx: &Context, version: &str, artifact: &ArtifactRef, emit: Emit<'_>) -> Result<InstalledRuntime, CoreError> {
        let staging = Staging::new(&ctx.layout, "mkxpz")?;
        let api = Self::api(ctx);
        let extract = fetch_and_extract(
            &ctx.http,
            FamilyId::Mkxpz,
            &artifact.url,
            api.spec(),
            &staging,
            "artifact.zip",
            emit,
        )?;
        let nested = extract_nested_zips(&extract).map_err(|e| extraction_failed(FamilyId::Mkxpz, e.to_string()))?;
        debug!("expanded {nested} nested archives");
        let root = locate_root(
            &extract,
            |d| find_app_bundle(d, Some(MKXPZ_APP_NAME)).is_some(),
            "",
            "mkxp",
        )
        .ok_or_else(|| extraction_failed(FamilyId::Mkxpz, format!("artifact {} holds no .app bundle", artifact.name)))?;

        let dest = ctx.layout.install_dir(FamilyId::Mkxpz, version, None, None);
        let meta = InstallMetadata::new(
            FamilyId::Mkxpz,
            version,
            InstallSource::GithubActions { run_id: artifact.run_id },
        )
        .with_detail("runId", artifact.run_id)
        .with_detail("artifactId", artifact.artifact_id)
        .with_detail("artifactName", artifact.name.as_str())
        .with_detail("sha", artifact.sha.as_str())
        .with_detail("date", artifact.date.as_str());
        commit(&root, &dest, &meta)?;
        ctx.store
            .runtime_at(FamilyId::Mkxpz, version, None, None)
            .ok_or_else(|| extraction_failed(FamilyId::Mkxpz, "install vanished after commit"))
    }

    /// Copy the bundled tree into the canonical install dir through staging.
    fn install_bundled(ctx: &Context, bundled: &BundledRuntime, emit: Emit<'_>) -> Result<InstalledRuntime, CoreError> {
        emit(ProgressEvent::Extracting);
        let staging = Staging::new(&ctx.layout, "mkxpz-bundled")?;
        let staged = staging.path().join("root");
        copy_dir_recursive(&bundled.dir, &staged)?;
        let dest = ctx.layout.install_dir(FamilyId::Mkxpz, &bundled.version, None, None);
        let meta = InstallMetadata::new(FamilyId::Mkxpz, &bundled.version, InstallSource::Bundled)
            .with_detail("bundledFrom", bundled.dir.to_string_lossy().as_ref());
        commit(&staged, &dest, &meta)?;
        ctx.store
            .runtime_at(FamilyId::Mkxpz, &bundled.version, None, None)
            .ok_or_else(|| extraction_failed(FamilyId::Mkxpz, "bundled install vanished after commit"))
    }
}

impl FamilyProvider for MkxpzProvider {
    fn family(&self) -> FamilyId {
        FamilyId::Mkxpz
    }

    fn fetch_catalog(&self, ctx: &Context) -> Result<CatalogListing, CoreError> {
        let builds = Self::list_builds(ctx)?;
        let source = format!("github-actions:{}", ctx.mkxpz.repo);
        if builds.is_empty() {
            return Err(RemoteError::NoVersions(source).into());
        }
        self.remember(&builds);
        Ok(CatalogListing {
            versions: builds.into_iter().map(|(v, _)| v).collect(),
            source,
        })
    }

    fn find_installed(&self, ctx: &Context, version: &str, _variant: Option<&str>) -> Option<InstalledRuntime> {
        ctx.store
            .runtime_at(FamilyId::Mkxpz, version, None, None)
            .or_else(|| {
                bundled_runtime(ctx)
                    .filter(|b| b.version == version)
                    .map(bundled_as_installed)
            })
    }

    fn install(&self, ctx: &Context, req: &InstallRequest, emit: Emit<'_>) -> Result<InstallOutcome, CoreError> {
        let bundled = bundled_runtime(ctx);
        if let Some(b) = bundled.as_ref().filter(|b| b.version == req.version) {
            info!("installing bundled MKXP-Z {}", b.version);
            return Ok(InstallOutcome::fresh(Self::install_bundled(ctx, b, emit)?));
        }

        let network = self
            .artifact_for(ctx, &req.version)
            .map_err(|e| download_failed(FamilyId::Mkxpz, e))
            .and_then(|artifact| Self::install_artifact(ctx, &req.version, &artifact, emit));
        match (network, bundled) {
            (Ok(runtime), _) => {
                info!("installed MKXP-Z {}", req.version);
                Ok(InstallOutcome::fresh(runtime))
            }
            (Err(e), Some(b)) => {
                warn!(
                    "MKXP-Z {} install failed ({e}); falling back to bundled {}",
                    req.version, b.version
                );
                Ok(InstallOutcome {
                    runtime: Self::install_bundled(ctx, &b, emit)?,
                    used_fallback: true,
                })
            }
            (Err(e), None) => Err(e),
        }
    }

    fn list_installed(&self, ctx: &Context) -> Vec<InstalledRuntime> {
        let mut list = ctx.store.list(FamilyId::Mkxpz);
        if let Some(b) = bundled_runtime(ctx) {
            if !list.iter().any(|r| r.version == b.version) {
                list.push(bundled_as_installed(b));
                list.sort_by(|a, b| compare_versions(VersionGrammar::DateHash, &b.version, &a.version));
            }
        }
        list
    }

    fn is_protected(&self, ctx: &Context, path: &Path) -> bool {
        ctx.mkxpz
            .bundled_dir
            .as_deref()
            .is_some_and(|root| path.starts_with(root))
    }

    fn not_installed_message(&self, version: &str) -> String {
        format!("MKXP-Z runtime {version} is not installed. Install it from Runtimes.")
    }
}
