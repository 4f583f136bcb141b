use super::{CatalogListing, Context, FamilyProvider};
use crate::install::{
    commit, download_failed, extraction_failed, fetch_and_extract, Emit, InstallOutcome,
    InstallRequest, Staging,
};
use crate::CoreError;
use stagehand_remote::github::{greenworks_nw_versions, select_greenworks_asset, sort_releases};
use stagehand_remote::{locate_root, GitHubApi, RemoteError, RequestSpec};
use stagehand_schema::{FamilyId, InstallSource, InstalledRuntime};
use stagehand_store::{has_greenworks_marker, InstallMetadata};
use tracing::info;

pub const GREENWORKS_REPO: &str = "greenheartgames/greenworks";
const MAX_RELEASE_PAGES: usize = 5;

pub(crate) struct GreenworksProvider;

fn api(ctx: &Context) -> GitHubApi<'_> {
    GitHubApi::new(&ctx.http, &ctx.remote.github_api_base, ctx.remote.github_token.clone())
}

impl FamilyProvider for GreenworksProvider {
    fn family(&self) -> FamilyId {
        FamilyId::Greenworks
    }

    fn fetch_catalog(&self, ctx: &Context) -> Result<CatalogListing, CoreError> {
        let releases = api(ctx).list_releases(GREENWORKS_REPO, MAX_RELEASE_PAGES)?;
        let versions = greenworks_nw_versions(&releases);
        if versions.is_empty() {
            return Err(RemoteError::NoVersions(format!("github:{GREENWORKS_REPO}")).into());
        }
        Ok(CatalogListing {
            versions,
            source: format!("github:{GREENWORKS_REPO}"),
        })
    }

    fn find_installed(&self, ctx: &Context, version: &str, _variant: Option<&str>) -> Option<InstalledRuntime> {
        ctx.store.runtime_at(FamilyId::Greenworks, version, None, None)
    }

    /// `req.version` is the NW.js version the build targets.
    fn install(&self, ctx: &Context, req: &InstallRequest, emit: Emit<'_>) -> Result<InstallOutcome, CoreError> {
        let mut releases = api(ctx)
            .list_releases(GREENWORKS_REPO, MAX_RELEASE_PAGES)
            .map_err(|e| download_failed(FamilyId::Greenworks, e))?;
        sort_releases(&mut releases);
        let found = select_greenworks_asset(&releases, &req.version).ok_or_else(|| {
            download_failed(
                FamilyId::Greenworks,
                RemoteError::NotFound(format!("no macOS Greenworks build for NW.js v{}", req.version)),
            )
        })?;

        let staging = Staging::new(&ctx.layout, "greenworks")?;
        let url = found.asset.browser_download_url.clone();
        let extract = fetch_and_extract(
            &ctx.http,
            FamilyId::Greenworks,
            &url,
            RequestSpec::default(),
            &staging,
            &found.asset.name,
            emit,
        )?;
        let root = locate_root(&extract, has_greenworks_marker, &req.version, "greenworks")
            .ok_or_else(|| {
                extraction_failed(
                    FamilyId::Greenworks,
                    format!("{} holds no greenworks.js or greenworks.node", found.asset.name),
                )
            })?;

        let dest = ctx.layout.install_dir(FamilyId::Greenworks, &req.version, None, None);
        let meta = InstallMetadata::new(
            FamilyId::Greenworks,
            &req.version,
            InstallSource::GithubRelease { url: url.clone() },
        )
        .with_detail("nwVersion", req.version.as_str())
        .with_detail("greenworksVersion", found.release_version.clone())
        .with_detail("assetName", found.asset.name.as_str())
        .with_detail("downloadUrl", url.as_str());
        commit(&root, &dest, &meta)?;
        info!(
            "installed Greenworks {} for NW.js {}",
            found.release_version.as_deref().unwrap_or("?"),
            req.version
        );

        ctx.store
            .runtime_at(FamilyId::Greenworks, &req.version, None, None)
            .map(InstallOutcome::fresh)
            .ok_or_else(|| extraction_failed(FamilyId::Greenworks, "install vanished after commit"))
    }

    fn not_installed_message(&self, version: &str) -> String {
        format!("Greenworks for NW.js v{version} is not installed. Install it from Runtimes.")
    }
}
