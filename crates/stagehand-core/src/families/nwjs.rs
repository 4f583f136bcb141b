use super::{CatalogListing, Context, FamilyProvider};
use crate::install::{
    commit, download_failed, extraction_failed, fetch_and_extract, Emit, InstallOutcome,
    InstallRequest, Staging,
};
use crate::CoreError;
use stagehand_remote::{fetch_first_listing, locate_root, RequestSpec};
use stagehand_schema::{FamilyId, InstallSource, InstalledRuntime, PlatformKey};
use stagehand_store::{InstallMetadata, NWJS_EXECUTABLE};
use tracing::{debug, info, warn};

pub(crate) struct NwjsProvider;

impl NwjsProvider {
    fn install_key(
        ctx: &Context,
        req: &InstallRequest,
        key: &PlatformKey,
        variant: &str,
        emit: Emit<'_>,
    ) -> Result<InstalledRuntime, CoreError> {
        let url = ctx.remote.nwjs_download_url(&req.version, key.as_str(), variant);
        let staging = Staging::new(&ctx.layout, "nwjs")?;
        let extract = fetch_and_extract(
            &ctx.http,
            FamilyId::Nwjs,
            &url,
            RequestSpec::default(),
            &staging,
            "nwjs.zip",
            emit,
        )?;
        let root = locate_root(&extract, |d| d.join("nwjs.app").is_dir(), &req.version, "nwjs")
            .ok_or_else(|| extraction_failed(FamilyId::Nwjs, format!("no nwjs.app found in {url}")))?;
        if !root.join(NWJS_EXECUTABLE).is_file() {
            return Err(extraction_failed(
                FamilyId::Nwjs,
                format!("{NWJS_EXECUTABLE} missing from {url}"),
            ));
        }

        let dest = ctx
            .layout
            .install_dir(FamilyId::Nwjs, &req.version, Some(key), Some(variant));
        let mut meta = InstallMetadata::new(FamilyId::Nwjs, &req.version, InstallSource::Download { url });
        meta.platform_key = Some(key.clone());
        meta.variant = Some(variant.to_owned());
        commit(&root, &dest, &meta)?;

        ctx.store
            .runtime_at(FamilyId::Nwjs, &req.version, Some(key), Some(variant))
            .ok_or_else(|| extraction_failed(FamilyId::Nwjs, "install vanished after commit"))
    }
}

impl FamilyProvider for NwjsProvider {
    fn family(&self) -> FamilyId {
        FamilyId::Nwjs
    }

    fn fetch_catalog(&self, ctx: &Context) -> Result<CatalogListing, CoreError> {
        let fetched = fetch_first_listing(&ctx.http, &ctx.remote.nwjs_catalog_sources)?;
        Ok(CatalogListing {
            versions: fetched.versions,
            source: fetched.source,
        })
    }

    fn find_installed(&self, ctx: &Context, version: &str, variant: Option<&str>) -> Option<InstalledRuntime> {
        let variant = variant.unwrap_or("sdk");
        ctx.host
            .platform_keys()
            .iter()
            .find_map(|key| ctx.store.runtime_at(FamilyId::Nwjs, version, Some(key), Some(variant)))
    }

    fn install(&self, ctx: &Context, req: &InstallRequest, emit: Emit<'_>) -> Result<InstallOutcome, CoreError> {
        let variant = req.variant.as_deref().unwrap_or("sdk");
        let mut last_err = None;
        for key in ctx.host.platform_keys() {
            if let Some(existing) =
                ctx.store
                    .runtime_at(FamilyId::Nwjs, &req.version, Some(&key), Some(variant))
            {
                return Ok(InstallOutcome::fresh(existing));
            }
            match Self::install_key(ctx, req, &key, variant, emit) {
                Ok(runtime) => {
                    info!("installed NW.js {} ({key}, {variant})", req.version);
                    return Ok(InstallOutcome::fresh(runtime));
                }
                Err(CoreError::DownloadFailed { source, .. }) if source.is_not_found() => {
                    debug!("no NW.js {} build for {key}, trying next platform", req.version);
                    last_err = Some(download_failed(FamilyId::Nwjs, source));
                }
                Err(e) => {
                    warn!("NW.js {} install for {key} failed: {e}", req.version);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            CoreError::NotInstalled(format!("no platform keys for NW.js {}", req.version))
        }))
    }
}
