//! Installation coordinator building blocks: progress events, staging, and
//! the download-extract-swap sequence shared by every family.
//!
//! Everything is staged under `<data>/runtimes/.staging`, on the same
//! filesystem as the install root, so the final rename is atomic and readers
//! never observe a half-extracted install.

use crate::CoreError;
use serde::Serialize;
use stagehand_remote::{extract_archive, HttpClient, RemoteError, RequestSpec};
use stagehand_schema::{FamilyId, InstalledRuntime};
use stagehand_store::{swap_into_place, write_install_metadata, DataLayout, InstallMetadata};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// One step of an install, in the order they occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Resolving { version: String },
    Downloading { downloaded: u64, total: Option<u64> },
    Extracting,
    Installed { install_dir: PathBuf },
}

/// Result of an install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    pub runtime: InstalledRuntime,
    /// The network install failed and a bundled copy was installed instead.
    pub used_fallback: bool,
}

impl InstallOutcome {
    pub fn fresh(runtime: InstalledRuntime) -> Self {
        Self {
            runtime,
            used_fallback: false,
        }
    }
}

/// A normalized install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub family: FamilyId,
    pub version: String,
    pub variant: Option<String>,
}

pub(crate) type Emit<'a> = &'a dyn Fn(ProgressEvent);

/// A scratch directory under the staging root, removed on drop.
pub(crate) struct Staging {
    dir: TempDir,
}

impl Staging {
    pub(crate) fn new(layout: &DataLayout, label: &str) -> Result<Self, CoreError> {
        let root = layout.staging_dir();
        fs::create_dir_all(&root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(&root)?;
        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn archive(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub(crate) fn extract_dir(&self) -> Result<PathBuf, CoreError> {
        let dir = self.dir.path().join("extract");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

pub(crate) fn download_failed(family: FamilyId, source: RemoteError) -> CoreError {
    CoreError::DownloadFailed {
        family: family.descriptor().label,
        source,
    }
}

pub(crate) fn extraction_failed(family: FamilyId, reason: impl Into<String>) -> CoreError {
    CoreError::ExtractionFailed {
        family: family.descriptor().label,
        reason: reason.into(),
    }
}

/// Download `url` into the staging dir and unpack it; returns the extract dir.
///
/// Download errors keep their [`RemoteError`] so callers can tell a 404 apart.
pub(crate) fn fetch_and_extract(
    http: &HttpClient,
    family: FamilyId,
    url: &str,
    spec: RequestSpec<'_>,
    staging: &Staging,
    archive_name: &str,
    emit: Emit<'_>,
) -> Result<PathBuf, CoreError> {
    let archive = staging.archive(archive_name);
    info!("downloading {family} from {url}");
    http.download_to_file(url, spec, &archive, &mut |downloaded, total| {
        emit(ProgressEvent::Downloading { downloaded, total });
    })
    .map_err(|e| download_failed(family, e))?;

    emit(ProgressEvent::Extracting);
    let extract = staging.extract_dir()?;
    extract_archive(&archive, &extract).map_err(|e| extraction_failed(family, e.to_string()))?;
    let _ = fs::remove_file(&archive);
    Ok(extract)
}

/// Record metadata inside the staged root and rename it into `dest`.
pub(crate) fn commit(staged_root: &Path, dest: &Path, meta: &InstallMetadata) -> Result<(), CoreError> {
    write_install_metadata(staged_root, meta)?;
    swap_into_place(staged_root, dest)?;
    debug!("{} {} committed to {}", meta.family, meta.version, dest.display());
    Ok(())
}
