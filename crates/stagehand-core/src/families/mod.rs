//! Per-family catalog and install behavior.
//!
//! Each runtime family has a provider that knows where its versions are
//! listed, how an archive is turned into an install, and what counts as
//! installed. The service owns one provider per family.

mod greenworks;
mod mkxpz;
mod nwjs;

pub use greenworks::GREENWORKS_REPO;
pub use mkxpz::BundledRuntime;

use crate::config::MkxpzConfig;
use crate::install::{Emit, InstallOutcome, InstallRequest};
use crate::CoreError;
use stagehand_remote::{HttpClient, RemoteConfig};
use stagehand_schema::{FamilyId, HostArch, InstalledRuntime};
use stagehand_store::{DataLayout, InstallStore};
use std::path::Path;

/// Everything a provider needs from its environment.
pub(crate) struct Context {
    pub layout: DataLayout,
    pub store: InstallStore,
    pub http: HttpClient,
    pub remote: RemoteConfig,
    pub mkxpz: MkxpzConfig,
    pub host: HostArch,
}

/// A fetched version listing, newest first.
#[derive(Debug, Clone)]
pub(crate) struct CatalogListing {
    pub versions: Vec<String>,
    pub source: String,
}

pub(crate) trait FamilyProvider: Send + Sync {
    fn family(&self) -> FamilyId;

    fn fetch_catalog(&self, ctx: &Context) -> Result<CatalogListing, CoreError>;

    /// The local install satisfying `(version, variant)`, without network access.
    fn find_installed(&self, ctx: &Context, version: &str, variant: Option<&str>) -> Option<InstalledRuntime>;

    fn install(&self, ctx: &Context, req: &InstallRequest, emit: Emit<'_>) -> Result<InstallOutcome, CoreError>;

    fn list_installed(&self, ctx: &Context) -> Vec<InstalledRuntime> {
        ctx.store.list(self.family())
    }

    /// Paths uninstall must never delete.
    fn is_protected(&self, _ctx: &Context, _path: &Path) -> bool {
        false
    }

    fn not_installed_message(&self, version: &str) -> String {
        format!(
            "{} runtime v{version} is not installed. Install it from Runtimes.",
            self.family().descriptor().label
        )
    }
}

/// Create the provider for a family.
pub(crate) fn provider_for(family: FamilyId) -> Box<dyn FamilyProvider> {
    match family {
        FamilyId::Nwjs => Box::new(nwjs::NwjsProvider),
        FamilyId::Greenworks => Box::new(greenworks::GreenworksProvider),
        FamilyId::Mkxpz => Box::new(mkxpz::MkxpzProvider::default()),
    }
}
