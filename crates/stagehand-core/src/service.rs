use crate::concurrency::{lock, Flight, StoreLock};
use crate::config::StagehandConfig;
use crate::families::{provider_for, Context, FamilyProvider};
use crate::install::{InstallOutcome, InstallRequest, ProgressEvent};
use crate::reconcile::{after_install, after_uninstall, apply_action};
use crate::report::{CatalogReport, FamilyReport};
use crate::CoreError;
use stagehand_remote::HttpClient;
use stagehand_schema::{
    is_valid_version, normalize_variant, normalize_version, sort_desc, CatalogState, CatalogStatus,
    FamilyId, FamilySettings, HostArch, InstallState, InstallStatus, InstalledRuntime, PlatformKey,
    Settings, SettingsAction,
};
use stagehand_store::{DataLayout, InstallStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use tracing::{debug, info, warn};

type InstallKey = (String, Option<String>);

struct Subscriber {
    token: u64,
    key: InstallKey,
    tx: Sender<ProgressEvent>,
}

/// Process-wide state of one runtime family.
struct FamilySlot {
    provider: Box<dyn FamilyProvider>,
    catalog: Mutex<CatalogState>,
    catalog_flight: Flight<(), CatalogState>,
    installing: Mutex<Option<InstallState>>,
    install_flight: Flight<InstallKey, InstallOutcome>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl FamilySlot {
    fn new(family: FamilyId) -> Self {
        Self {
            provider: provider_for(family),
            catalog: Mutex::new(CatalogState::default()),
            catalog_flight: Flight::new(),
            installing: Mutex::new(None),
            install_flight: Flight::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Merge `event` into the install snapshot and fan it out to subscribers of `key`.
    fn publish(&self, key: &InstallKey, event: &ProgressEvent) {
        if let Some(state) = lock(&self.installing).as_mut() {
            match event {
                ProgressEvent::Downloading { downloaded, total } => {
                    state.status = InstallStatus::Downloading;
                    state.downloaded = *downloaded;
                    state.total = *total;
                }
                ProgressEvent::Extracting => state.status = InstallStatus::Extracting,
                ProgressEvent::Resolving { .. } | ProgressEvent::Installed { .. } => {}
            }
        }
        lock(&self.subscribers).retain(|s| s.key != *key || s.tx.send(event.clone()).is_ok());
    }
}

/// What to remove on uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallTarget {
    Dir(PathBuf),
    /// Every install of `version` matching the given dimensions.
    Version {
        version: String,
        platform_key: Option<PlatformKey>,
        variant: Option<String>,
    },
}

/// Owns one state record per runtime family and every provisioning operation.
///
/// Catalog refreshes and installs run at most once at a time per family;
/// concurrent callers join or queue behind the in-flight operation (see
/// [`Flight`]). Installs additionally hold a file lock so separate processes
/// sharing a data dir serialize too.
pub struct ProvisioningService {
    config: StagehandConfig,
    pub(crate) ctx: Context,
    slots: BTreeMap<FamilyId, FamilySlot>,
    next_token: AtomicU64,
}

impl ProvisioningService {
    pub fn new(config: StagehandConfig) -> Self {
        Self::with_host(config, HostArch::detect())
    }

    /// A service that resolves platform keys for `host` instead of this machine.
    pub fn with_host(config: StagehandConfig, host: HostArch) -> Self {
        let layout = DataLayout::new(config.resolved_data_dir());
        let remote = config.remote.clone().with_env_token();
        let http = HttpClient::new(&remote.user_agent).with_max_redirects(config.max_redirects);
        let ctx = Context {
            store: InstallStore::new(layout.clone()),
            layout,
            http,
            remote,
            mkxpz: config.mkxpz.clone(),
            host,
        };
        let slots = FamilyId::ALL.iter().map(|&f| (f, FamilySlot::new(f))).collect();
        Self {
            config,
            ctx,
            slots,
            next_token: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StagehandConfig {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.ctx.layout
    }

    pub fn host(&self) -> HostArch {
        self.ctx.host
    }

    fn slot(&self, family: FamilyId) -> &FamilySlot {
        &self.slots[&family]
    }

    pub fn settings(&self) -> Result<Settings, CoreError> {
        Ok(Settings::load(self.ctx.layout.settings_file())?)
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), CoreError> {
        settings.save(self.ctx.layout.settings_file())?;
        Ok(())
    }

    pub fn family_settings(&self, family: FamilyId) -> Result<FamilySettings, CoreError> {
        Ok(self.settings()?.family(family))
    }

    // -- catalog -----------------------------------------------------------

    /// The cached catalog, without fetching.
    pub fn catalog(&self, family: FamilyId) -> CatalogState {
        lock(&self.slot(family).catalog).clone()
    }

    /// Refresh the catalog unless a fresh copy is cached (or `force`).
    ///
    /// A failed refresh leaves an error state with no versions and is also
    /// returned to every caller that joined it.
    pub fn refresh_catalog(&self, family: FamilyId, force: bool) -> Result<CatalogState, CoreError> {
        let slot = self.slot(family);
        if !force {
            let cached = self.catalog(family);
            if cached.is_fresh(self.config.catalog_ttl(), chrono::Utc::now()) {
                debug!("{family} catalog is fresh");
                return Ok(cached);
            }
        }
        slot.catalog_flight.run((), || {
            let descriptor = family.descriptor();
            lock(&slot.catalog).status = CatalogStatus::Loading;
            match slot.provider.fetch_catalog(&self.ctx) {
                Ok(listing) => {
                    let mut versions = listing.versions;
                    versions.retain(|v| is_valid_version(descriptor, v));
                    sort_desc(descriptor.grammar, &mut versions);
                    info!("{family}: {} versions from {}", versions.len(), listing.source);
                    let state = CatalogState::succeeded(versions, listing.source);
                    *lock(&slot.catalog) = state.clone();
                    Ok(state)
                }
                Err(e) => {
                    warn!("{family} catalog refresh failed: {e}");
                    *lock(&slot.catalog) = CatalogState::failed(e.to_string());
                    Err(e)
                }
            }
        })
    }

    // -- installs ----------------------------------------------------------

    fn request(&self, family: FamilyId, version: &str, variant: Option<&str>) -> Result<InstallRequest, CoreError> {
        let descriptor = family.descriptor();
        Ok(InstallRequest {
            family,
            version: normalize_version(descriptor, version)?,
            variant: normalize_variant(descriptor, variant)?,
        })
    }

    /// The install satisfying `(version, variant)`, trying host platform keys in order.
    pub fn resolve_best_installed(
        &self,
        family: FamilyId,
        version: &str,
        variant: Option<&str>,
    ) -> Result<Option<InstalledRuntime>, CoreError> {
        let req = self.request(family, version, variant)?;
        Ok(self
            .slot(family)
            .provider
            .find_installed(&self.ctx, &req.version, req.variant.as_deref()))
    }

    /// An install at its canonical path (a bundled tree elsewhere does not count).
    fn canonical_install(&self, slot: &FamilySlot, req: &InstallRequest) -> Option<InstalledRuntime> {
        slot.provider
            .find_installed(&self.ctx, &req.version, req.variant.as_deref())
            .filter(|r| !slot.provider.is_protected(&self.ctx, &r.install_dir))
    }

    pub fn list_installed(&self, family: FamilyId) -> Vec<InstalledRuntime> {
        self.slot(family).provider.list_installed(&self.ctx)
    }

    /// Snapshot of the in-flight (or last failed) install.
    pub fn installing(&self, family: FamilyId) -> Option<InstallState> {
        lock(&self.slot(family).installing).clone()
    }

    /// Install `version`, or return the existing install without network access.
    ///
    /// Progress events go to `progress` when given. A concurrent call for the
    /// same `(version, variant)` joins the running install; one for another
    /// version waits for it to settle first.
    pub fn install(
        &self,
        family: FamilyId,
        version: &str,
        variant: Option<&str>,
        progress: Option<Sender<ProgressEvent>>,
    ) -> Result<InstallOutcome, CoreError> {
        let req = self.request(family, version, variant)?;
        let slot = self.slot(family);
        if let Some(existing) = self.canonical_install(slot, &req) {
            debug!("{family} {} already installed at {}", req.version, existing.install_dir.display());
            if let Some(tx) = progress {
                let _ = tx.send(ProgressEvent::Installed {
                    install_dir: existing.install_dir.clone(),
                });
            }
            return Ok(InstallOutcome::fresh(existing));
        }

        let key: InstallKey = (req.version.clone(), req.variant.clone());
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = progress {
            lock(&slot.subscribers).push(Subscriber {
                token,
                key: key.clone(),
                tx,
            });
        }
        let result = slot
            .install_flight
            .run(key.clone(), || self.run_install(slot, &req, &key));
        lock(&slot.subscribers).retain(|s| s.token != token);
        result
    }

    fn run_install(&self, slot: &FamilySlot, req: &InstallRequest, key: &InstallKey) -> Result<InstallOutcome, CoreError> {
        let family = req.family;
        self.ctx.layout.initialize()?;
        let _lock = StoreLock::acquire(&self.ctx.layout.family_lock(family))?;

        // Another process may have finished while we waited for the lock.
        if let Some(existing) = self.canonical_install(slot, req) {
            slot.publish(
                key,
                &ProgressEvent::Installed {
                    install_dir: existing.install_dir.clone(),
                },
            );
            return Ok(InstallOutcome::fresh(existing));
        }

        *lock(&slot.installing) = Some(InstallState::started(&req.version, req.variant.as_deref()));
        let emit = |event: ProgressEvent| slot.publish(key, &event);
        emit(ProgressEvent::Resolving {
            version: req.version.clone(),
        });

        match slot.provider.install(&self.ctx, req, &emit) {
            Ok(outcome) => {
                *lock(&slot.installing) = None;
                emit(ProgressEvent::Installed {
                    install_dir: outcome.runtime.install_dir.clone(),
                });
                if let Err(e) = self.reconcile_after_install(family, &outcome.runtime) {
                    warn!("could not update {family} settings: {e}");
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Some(state) = lock(&slot.installing).as_mut() {
                    state.status = InstallStatus::Error;
                    state.error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    fn reconcile_after_install(&self, family: FamilyId, runtime: &InstalledRuntime) -> Result<(), CoreError> {
        let settings = self.settings()?;
        let next = after_install(&settings, family, runtime);
        if next != settings {
            self.save_settings(&next)?;
        }
        Ok(())
    }

    /// The local install of `version`, installing it first when allowed.
    pub fn ensure_installed(
        &self,
        family: FamilyId,
        version: &str,
        variant: Option<&str>,
        allow_install: bool,
        progress: Option<Sender<ProgressEvent>>,
    ) -> Result<InstalledRuntime, CoreError> {
        let req = self.request(family, version, variant)?;
        let slot = self.slot(family);
        if let Some(found) = slot
            .provider
            .find_installed(&self.ctx, &req.version, req.variant.as_deref())
        {
            return Ok(found);
        }
        if !allow_install {
            return Err(CoreError::NotInstalled(slot.provider.not_installed_message(&req.version)));
        }
        Ok(self
            .install(family, &req.version, req.variant.as_deref(), progress)?
            .runtime)
    }

    /// Remove installs and re-point the default if it went away.
    pub fn uninstall(&self, family: FamilyId, target: &UninstallTarget) -> Result<Vec<PathBuf>, CoreError> {
        let slot = self.slot(family);
        let descriptor = family.descriptor();
        let dirs: Vec<PathBuf> = match target {
            UninstallTarget::Dir(dir) => {
                if slot.provider.is_protected(&self.ctx, dir) {
                    return Err(CoreError::BundledRuntime(dir.clone()));
                }
                vec![dir.clone()]
            }
            UninstallTarget::Version {
                version,
                platform_key,
                variant,
            } => {
                let version = normalize_version(descriptor, version)?;
                let variant = match variant {
                    Some(v) => normalize_variant(descriptor, Some(v))?,
                    None => None,
                };
                let matching: Vec<InstalledRuntime> = slot
                    .provider
                    .list_installed(&self.ctx)
                    .into_iter()
                    .filter(|r| r.version == version)
                    .filter(|r| wanted(platform_key.as_ref(), r.platform_key.as_ref()))
                    .filter(|r| wanted(variant.as_ref(), r.variant.as_ref()))
                    .collect();
                if matching.is_empty() {
                    return Err(CoreError::NotInstalled(slot.provider.not_installed_message(&version)));
                }
                let (bundled, removable): (Vec<_>, Vec<_>) = matching
                    .into_iter()
                    .partition(|r| slot.provider.is_protected(&self.ctx, &r.install_dir));
                if removable.is_empty() {
                    return Err(CoreError::BundledRuntime(bundled[0].install_dir.clone()));
                }
                removable.into_iter().map(|r| r.install_dir).collect()
            }
        };

        {
            self.ctx.layout.initialize()?;
            let _lock = StoreLock::acquire(&self.ctx.layout.family_lock(family))?;
            for dir in &dirs {
                self.ctx.store.remove_dir(family, dir)?;
                info!("removed {family} install {}", dir.display());
            }
        }

        let remaining = self.list_installed(family);
        let settings = self.settings()?;
        let next = after_uninstall(&settings, family, &remaining);
        if next != settings {
            self.save_settings(&next)?;
        }
        Ok(dirs)
    }

    // -- settings and reporting --------------------------------------------

    pub fn apply_settings_action(&self, family: FamilyId, action: &SettingsAction) -> Result<FamilySettings, CoreError> {
        let settings = self.settings()?;
        let next = apply_action(&settings, family, action)?;
        self.save_settings(&next)?;
        Ok(next.family(family))
    }

    /// Settings plus the ephemeral install and catalog blocks for `family`.
    pub fn state_report(&self, family: FamilyId) -> Result<FamilyReport, CoreError> {
        let settings = self.family_settings(family)?;
        let installed = self.list_installed(family);
        let catalog = CatalogReport::build(family, self.catalog(family), &settings, &installed);
        Ok(FamilyReport {
            family,
            label: family.descriptor().label,
            settings,
            installed,
            installing: self.installing(family),
            catalog,
        })
    }
}

/// `None` matches anything; `Some(x)` only an equal value.
fn wanted<T: PartialEq>(filter: Option<&T>, value: Option<&T>) -> bool {
    match filter {
        None => true,
        Some(want) => value == Some(want),
    }
}
