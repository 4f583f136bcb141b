//! Per-guest launch directories.
//!
//! A wrapper lives at `<data>/modules/<module>/nwjs/wrappers/<id>` and holds
//! links (or copies) of the guest's top-level entries next to files the
//! builder owns: the rewritten manifest, guard scripts, and an identity
//! marker recording which content root the overlay came from. A wrapper whose
//! marker names a different root is never reused in place; a sibling
//! `<id>-<millis>` directory is minted instead.

use crate::entry::{read_package_json, GuestContentEntry};
use crate::guard::{self, GuardPolicy};
use crate::manifest::{rewrite_manifest, ManifestInputs, BG_SCRIPT, END_SCRIPT, START_SCRIPT};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stagehand_schema::stable_id;
use stagehand_store::{
    atomic_write, force_remove, link_or_copy, probe_symlink, write_json_atomic, DataLayout,
    OverlayMode, OverlayTally,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

pub const WRAPPER_MARKER: &str = ".stagehand-wrapper.json";
pub const INTERNAL_DIR: &str = "__stagehand";
const PATCHED_RUNTIME_ROOT: &str = "__stagehand/nwjs-patched";
const INJECT_SCRIPT: &str = "stagehand-inject.js";

const RESERVED: [&str; 11] = [
    "package.json",
    "bg.js",
    "disable-child.js",
    "disable-net.js",
    INTERNAL_DIR,
    INJECT_SCRIPT,
    "stagehand-start.js",
    "stagehand-end.js",
    "stagehand-offline.js",
    "stagehand-devtools.js",
    WRAPPER_MARKER,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFile {
    pub path: String,
    pub contents: String,
}

/// Script patch selection handed to the in-guest loader via `patch.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchConfig {
    #[serde(default)]
    pub modules: Vec<Value>,
    #[serde(default)]
    pub scripts: Vec<Value>,
    #[serde(default)]
    pub user_script_root: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WrapperOptions {
    pub enable_protections: bool,
    pub case_insensitive: bool,
    pub inject_start: Vec<String>,
    pub chromium_args: Vec<String>,
    pub extra_files: Vec<ExtraFile>,
    pub patch: PatchConfig,
    pub enable_user_scripts: bool,
    pub cheats_file_path: Option<PathBuf>,
    /// Prepend the devtools helper to the start script.
    pub devtools: bool,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            enable_protections: true,
            case_insensitive: false,
            inject_start: Vec::new(),
            chromium_args: Vec::new(),
            extra_files: Vec::new(),
            patch: PatchConfig::default(),
            enable_user_scripts: false,
            cheats_file_path: None,
            devtools: guard::devtools_requested(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperResult {
    pub path: PathBuf,
    pub id: String,
    /// A new suffixed directory was created because the base wrapper belongs
    /// to another content root.
    pub minted: bool,
    pub overlay_mode: OverlayMode,
    pub overlay: OverlayTally,
}

#[derive(Debug, Serialize, Deserialize)]
struct WrapperMarker {
    source: String,
}

fn marker_source(dir: &Path) -> Option<String> {
    let raw = fs::read_to_string(dir.join(WRAPPER_MARKER)).ok()?;
    serde_json::from_str::<WrapperMarker>(&raw).ok().map(|m| m.source)
}

/// Pick the wrapper directory for `id`, minting a new one on identity mismatch.
///
/// A previously minted sibling whose marker matches `source` is reused, so
/// repeated builds after a relocation converge on one directory.
fn resolve_wrapper_dir(root: &Path, id: &str, source: &str) -> (PathBuf, bool) {
    let base = root.join(id);
    match marker_source(&base) {
        None => return (base, false),
        Some(s) if s == source => return (base, false),
        Some(_) => {}
    }

    let prefix = format!("{id}-");
    let mut siblings: Vec<PathBuf> = fs::read_dir(root)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .collect();
    siblings.sort();
    if let Some(existing) = siblings
        .into_iter()
        .rev()
        .find(|d| marker_source(d).as_deref() == Some(source))
    {
        return (existing, false);
    }

    let mut millis = chrono::Utc::now().timestamp_millis();
    loop {
        let candidate = root.join(format!("{id}-{millis}"));
        if fs::symlink_metadata(&candidate).is_err() {
            info!("wrapper {id} belongs to another content root, minting {}", candidate.display());
            return (candidate, true);
        }
        millis += 1;
    }
}

/// Clean an extra file path: leading separators and `.` dropped, `..` refused.
fn normalize_extra_path(raw: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for c in Path::new(raw.trim()).components() {
        match c {
            Component::Normal(p) => out.push(p),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

fn relative_main(entry: &GuestContentEntry) -> Result<String, RuntimeError> {
    let rel = entry
        .entry_html
        .strip_prefix(&entry.content_root)
        .map_err(|_| {
            RuntimeError::WrapperInputMissing(format!(
                "entry {} is not inside content root {}",
                entry.entry_html.display(),
                entry.content_root.display()
            ))
        })?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

fn write_text(path: &Path, text: &str) -> Result<(), RuntimeError> {
    atomic_write(path, text.as_bytes())?;
    Ok(())
}

/// Build or refresh the wrapper directory for `entry`.
pub fn build_wrapper(
    layout: &DataLayout,
    entry: &GuestContentEntry,
    module_id: &str,
    options: &WrapperOptions,
) -> Result<WrapperResult, RuntimeError> {
    if !entry.content_root.is_dir() || !entry.entry_html.is_file() {
        return Err(RuntimeError::WrapperInputMissing(
            "Missing game data required for the NW.js wrapper.".to_owned(),
        ));
    }
    let main = relative_main(entry)?;
    let id = entry
        .guest_id
        .clone()
        .unwrap_or_else(|| stable_id(&entry.game_path).into_inner());
    let source = entry.content_root.to_string_lossy().into_owned();

    let wrappers_root = layout.wrappers_dir(module_id);
    fs::create_dir_all(&wrappers_root)?;
    let (wrapper, minted) = resolve_wrapper_dir(&wrappers_root, &id, &source);
    fs::create_dir_all(&wrapper)?;
    debug!("building wrapper {} for {}", wrapper.display(), source);

    let rewritten = rewrite_manifest(
        read_package_json(&entry.content_root),
        &ManifestInputs {
            wrapper_id: &id,
            game_path: &entry.game_path,
            module_id,
            relative_main: main,
            protections: options.enable_protections,
            case_insensitive: options.case_insensitive,
            inject_start: &options.inject_start,
            chromium_args: &options.chromium_args,
            cheats_file_path: options.cheats_file_path.as_deref(),
        },
    );

    let mut extras: Vec<(PathBuf, &str)> = Vec::new();
    for extra in &options.extra_files {
        match normalize_extra_path(&extra.path) {
            Some(p) => extras.push((p, extra.contents.as_str())),
            None => warn!("ignoring extra file with unusable path: {:?}", extra.path),
        }
    }
    let mut blocklist: BTreeSet<String> = RESERVED.iter().map(|s| (*s).to_owned()).collect();
    for (path, _) in &extras {
        if let Some(Component::Normal(top)) = path.components().next() {
            blocklist.insert(top.to_string_lossy().into_owned());
        }
    }

    let overlay_mode = probe_symlink(&wrapper);
    let mut overlay = OverlayTally::default();
    let mut items: Vec<_> = fs::read_dir(&entry.content_root)?
        .filter_map(Result::ok)
        .collect();
    items.sort_by_key(fs::DirEntry::file_name);
    for item in items {
        let name = item.file_name();
        if blocklist.contains(name.to_string_lossy().as_ref()) {
            continue;
        }
        overlay.record(link_or_copy(&item.path(), &wrapper.join(&name), overlay_mode)?);
    }

    write_json_atomic(&wrapper.join(WRAPPER_MARKER), &WrapperMarker { source: source.clone() })?;
    write_json_atomic(&wrapper.join("package.json"), &rewritten.manifest)?;
    for (path, contents) in &extras {
        let dest = wrapper.join(path);
        if fs::symlink_metadata(&dest).is_ok_and(|m| m.file_type().is_symlink()) {
            force_remove(&dest);
        }
        write_text(&dest, contents)?;
    }

    let patched = wrapper.join(PATCHED_RUNTIME_ROOT);
    fs::create_dir_all(&patched)?;
    write_text(&patched.join("case-insensitive-nw.js"), guard::render_case_insensitive())?;
    write_text(&patched.join("loader.js"), guard::render_loader())?;
    write_json_atomic(
        &patched.join("patch.json"),
        &json!({
            "runtimeRoot": PATCHED_RUNTIME_ROOT,
            "modules": options.patch.modules,
            "scripts": options.patch.scripts,
            "enableUserScripts": options.enable_user_scripts,
            "userScriptRoot": options.patch.user_script_root,
        }),
    )?;

    let policy = GuardPolicy::default();
    write_text(&wrapper.join("disable-child.js"), guard::render_disable_child())?;
    write_text(&wrapper.join("disable-net.js"), &policy.render_disable_net())?;
    write_text(&wrapper.join("stagehand-offline.js"), &policy.render_offline())?;
    write_text(&wrapper.join(START_SCRIPT), &guard::render_start(options.devtools))?;

    if options.cheats_file_path.is_some() {
        write_text(&wrapper.join(INJECT_SCRIPT), guard::render_inject())?;
    } else {
        force_remove(&wrapper.join(INJECT_SCRIPT));
    }

    if rewritten.needs_bg {
        write_text(&wrapper.join(BG_SCRIPT), guard::render_bg())?;
    } else {
        force_remove(&wrapper.join(BG_SCRIPT));
    }
    if rewritten.inject_end.is_empty() {
        force_remove(&wrapper.join(END_SCRIPT));
    } else {
        write_text(&wrapper.join(END_SCRIPT), guard::render_end())?;
    }

    debug!(
        "wrapper {} ready: {} linked, {} copied, {} skipped",
        wrapper.display(),
        overlay.linked,
        overlay.copied,
        overlay.skipped
    );
    Ok(WrapperResult {
        path: wrapper,
        id,
        minted,
        overlay_mode,
        overlay,
    })
}
