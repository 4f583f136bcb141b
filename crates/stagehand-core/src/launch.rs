//! Turning an installed runtime plus guest content into a running process.

use crate::install::ProgressEvent;
use crate::service::ProvisioningService;
use crate::concurrency::shutdown_requested;
use crate::CoreError;
use serde::Serialize;
use stagehand_runtime::{
    build_wrapper, find_sdk_targets, launch, overlay_sdk, ExtraFile, GuestContentEntry, LaunchRequest,
    LaunchedProcess, PatchConfig, WrapperOptions, WrapperResult,
};
use stagehand_schema::{stable_id, FamilyId, FamilySettings, InstalledRuntime};
use stagehand_store::force_remove;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, info};

const GREENWORKS_MISSING: &str =
    "Greenworks is required but no Greenworks runtime is installed. Install it from Runtimes.";

/// Everything needed to wrap and start one guest.
#[derive(Debug, Clone)]
pub struct GuestLaunch {
    pub module_id: String,
    pub entry: GuestContentEntry,
    /// Runtime version; falls back to the settings default, then the family default.
    pub version: Option<String>,
    pub variant: Option<String>,
    /// Install the runtime when it is missing instead of failing.
    pub allow_install: bool,
    pub inject_start: Vec<String>,
    pub chromium_args: Vec<String>,
    pub extra_files: Vec<ExtraFile>,
    pub patch: PatchConfig,
    pub cheats_file_path: Option<PathBuf>,
    /// Per-launch override of the persisted protections toggle.
    pub protections: Option<bool>,
    /// Per-launch override of the persisted case-insensitivity toggle.
    pub case_insensitive: Option<bool>,
}

impl GuestLaunch {
    pub fn new(module_id: impl Into<String>, entry: GuestContentEntry) -> Self {
        Self {
            module_id: module_id.into(),
            entry,
            version: None,
            variant: None,
            allow_install: false,
            inject_start: Vec::new(),
            chromium_args: Vec::new(),
            extra_files: Vec::new(),
            patch: PatchConfig::default(),
            cheats_file_path: None,
            protections: None,
            case_insensitive: None,
        }
    }

    fn options(&self, settings: &FamilySettings) -> WrapperOptions {
        WrapperOptions {
            enable_protections: self.protections.unwrap_or(settings.enable_protections),
            case_insensitive: self.case_insensitive.unwrap_or(settings.case_insensitive),
            inject_start: self.inject_start.clone(),
            chromium_args: self.chromium_args.clone(),
            extra_files: self.extra_files.clone(),
            patch: self.patch.clone(),
            enable_user_scripts: settings.enable_user_scripts,
            cheats_file_path: self.cheats_file_path.clone(),
            ..WrapperOptions::default()
        }
    }
}

/// A built wrapper and the SDK targets that were overlaid into it.
#[derive(Debug, Clone, Serialize)]
pub struct WrappedGuest {
    pub wrapper: WrapperResult,
    pub sdk_targets: Vec<PathBuf>,
    pub greenworks: Option<InstalledRuntime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub runtime: InstalledRuntime,
    #[serde(flatten)]
    pub wrapped: WrappedGuest,
    pub process: LaunchedProcess,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
}

impl ProvisioningService {
    /// `(version, variant)` to launch with: explicit, then settings, then family default.
    pub fn resolve_launch_version(&self, request: &GuestLaunch) -> Result<(String, Option<String>), CoreError> {
        let settings = self.family_settings(FamilyId::Nwjs)?;
        let version = request
            .version
            .clone()
            .or(settings.default_version)
            .or_else(|| FamilyId::Nwjs.descriptor().default_version.map(str::to_owned))
            .ok_or_else(|| CoreError::NotInstalled("no NW.js version selected".to_owned()))?;
        let variant = request.variant.clone().or(settings.default_variant);
        Ok((version, variant))
    }

    /// The Greenworks install to overlay: the configured one when present, else the newest.
    fn greenworks_runtime(&self, settings: &FamilySettings) -> Result<InstalledRuntime, CoreError> {
        if let Some(ref wanted) = settings.greenworks_default_version {
            if let Some(found) = self.resolve_best_installed(FamilyId::Greenworks, wanted, None)? {
                return Ok(found);
            }
            debug!("configured Greenworks {wanted} is not installed, using the newest");
        }
        self.list_installed(FamilyId::Greenworks)
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotInstalled(GREENWORKS_MISSING.to_owned()))
    }

    /// SDK targets in the guest and the Greenworks build to overlay onto them.
    fn sdk_requirement(
        &self,
        request: &GuestLaunch,
        settings: &FamilySettings,
    ) -> Result<(Vec<PathBuf>, Option<InstalledRuntime>), CoreError> {
        let sdk_targets = find_sdk_targets(&request.entry.content_root);
        if sdk_targets.is_empty() {
            return Ok((sdk_targets, None));
        }
        let greenworks = self.greenworks_runtime(settings)?;
        Ok((sdk_targets, Some(greenworks)))
    }

    /// Build the wrapper for a guest and overlay any SDK it needs.
    pub fn wrap(&self, request: &GuestLaunch) -> Result<WrappedGuest, CoreError> {
        let settings = self.family_settings(FamilyId::Nwjs)?;
        let (sdk_targets, greenworks) = self.sdk_requirement(request, &settings)?;
        self.wrap_with(request, &settings, sdk_targets, greenworks)
    }

    fn wrap_with(
        &self,
        request: &GuestLaunch,
        settings: &FamilySettings,
        sdk_targets: Vec<PathBuf>,
        greenworks: Option<InstalledRuntime>,
    ) -> Result<WrappedGuest, CoreError> {
        let wrapper = build_wrapper(self.layout(), &request.entry, &request.module_id, &request.options(settings))?;
        if let Some(ref sdk) = greenworks {
            let count = overlay_sdk(&wrapper.path, &request.entry.content_root, &sdk.install_dir, &sdk_targets)?;
            info!("overlaid Greenworks {} onto {count} location(s)", sdk.version);
        }
        Ok(WrappedGuest {
            wrapper,
            sdk_targets,
            greenworks,
        })
    }

    /// Resolve and (optionally) install the runtime, wrap the guest, and spawn it.
    ///
    /// A guest that embeds Greenworks runs on the NW.js version its
    /// Greenworks build targets unless a version was asked for explicitly.
    pub fn prepare_launch(
        &self,
        request: &GuestLaunch,
        progress: Option<Sender<ProgressEvent>>,
    ) -> Result<LaunchReport, CoreError> {
        let settings = self.family_settings(FamilyId::Nwjs)?;
        let (sdk_targets, greenworks) = self.sdk_requirement(request, &settings)?;
        let (mut version, variant) = self.resolve_launch_version(request)?;
        if let (None, Some(sdk)) = (&request.version, &greenworks) {
            debug!("pinning NW.js to {} for Greenworks", sdk.version);
            version.clone_from(&sdk.version);
        }
        let runtime = self.ensure_installed(
            FamilyId::Nwjs,
            &version,
            variant.as_deref(),
            request.allow_install,
            progress,
        )?;
        let wrapped = self.wrap_with(request, &settings, sdk_targets, greenworks)?;
        if shutdown_requested() {
            info!("shutdown requested, not starting {}", request.module_id);
            return Err(CoreError::Interrupted);
        }

        let mut env = Vec::new();
        if request.case_insensitive.unwrap_or(settings.case_insensitive) {
            env.push(("STAGEHAND_CIFS".to_owned(), "1".to_owned()));
        }
        let guest_id = stable_id(&request.entry.game_path);
        let profile_dir = self
            .layout()
            .profile_dir(&request.module_id, guest_id.as_str(), &runtime.signature());
        let process = launch(&LaunchRequest {
            runtime: &runtime,
            app_dir: &wrapped.wrapper.path,
            profile_dir: &profile_dir,
            host: self.host(),
            env,
        })?;
        info!("launched {} (pid {}) with NW.js {}", request.module_id, process.pid, runtime.signature());
        Ok(LaunchReport {
            runtime,
            wrapped,
            process,
        })
    }

    /// Remove every wrapper, profile and app bundle derived from `game_path`.
    pub fn cleanup_guest_data(&self, module_id: &str, game_path: &Path) -> Result<CleanupReport, CoreError> {
        let id = stable_id(game_path);
        let layout = self.layout();
        let mut doomed = Vec::new();

        let wrappers = layout.wrappers_dir(module_id);
        if let Ok(entries) = fs::read_dir(&wrappers) {
            let prefix = format!("{id}-");
            for entry in entries.filter_map(Result::ok) {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == id.as_str() || name.starts_with(&prefix) {
                    doomed.push(entry.path());
                }
            }
        }
        doomed.push(layout.profiles_dir(module_id).join(id.as_str()));
        doomed.push(layout.app_bundle(module_id, id.as_str()));

        let mut report = CleanupReport::default();
        for path in doomed {
            if fs::symlink_metadata(&path).is_ok() {
                force_remove(&path);
                debug!("removed {}", path.display());
                report.removed.push(path);
            }
        }
        report.removed.sort();
        Ok(report)
    }
}
