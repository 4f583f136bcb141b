//! Copying a separately installed native SDK module (Greenworks) over the
//! places inside a wrapper where the guest expects to load it.

use crate::RuntimeError;
use stagehand_store::{copy_tree_over, force_remove, link_or_copy, probe_symlink};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SDK_MARKERS: [&str; 2] = ["greenworks.js", "greenworks.node"];
const MAX_DEPTH: usize = 8;

/// Directories under `root` that hold an SDK marker file, breadth first.
pub fn find_sdk_targets(root: &Path) -> Vec<PathBuf> {
    let mut targets = Vec::new();
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);
    while let Some((dir, depth)) = queue.pop_front() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut names: Vec<_> = entries.filter_map(Result::ok).collect();
        names.sort_by_key(fs::DirEntry::file_name);
        let mut is_target = false;
        for entry in names {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let Ok(ft) = entry.file_type() else { continue };
            if ft.is_dir() {
                if depth < MAX_DEPTH {
                    queue.push_back((entry.path(), depth + 1));
                }
            } else if ft.is_file() && SDK_MARKERS.contains(&name.to_ascii_lowercase().as_str()) {
                is_target = true;
            }
        }
        if is_target {
            targets.push(dir);
        }
    }
    targets
}

/// Turn `rel` inside the wrapper into real directories.
///
/// Each symlinked component is replaced by a directory whose children link
/// back into `source_root`, so writing into the result never touches the
/// guest's original files.
pub fn ensure_materialized_path(wrapper: &Path, source_root: &Path, rel: &Path) -> Result<PathBuf, RuntimeError> {
    let mode = probe_symlink(wrapper);
    let mut current_wrapper = wrapper.to_path_buf();
    let mut current_source = source_root.to_path_buf();
    for part in rel.components() {
        let std::path::Component::Normal(part) = part else {
            continue;
        };
        let wrapper_path = current_wrapper.join(part);
        let source_path = current_source.join(part);
        let is_link = fs::symlink_metadata(&wrapper_path).is_ok_and(|m| m.file_type().is_symlink());
        if is_link {
            force_remove(&wrapper_path);
        }
        if !wrapper_path.exists() {
            fs::create_dir_all(&wrapper_path)?;
            if let Ok(entries) = fs::read_dir(&source_path) {
                for entry in entries.filter_map(Result::ok) {
                    link_or_copy(&entry.path(), &wrapper_path.join(entry.file_name()), mode)?;
                }
            }
        }
        current_wrapper = wrapper_path;
        current_source = source_path;
    }
    Ok(current_wrapper)
}

/// Copy `sdk_dir` over every target. Targets are absolute paths under `source_root`.
pub fn overlay_sdk(
    wrapper: &Path,
    source_root: &Path,
    sdk_dir: &Path,
    targets: &[PathBuf],
) -> Result<usize, RuntimeError> {
    for target in targets {
        let rel = target.strip_prefix(source_root).unwrap_or(Path::new(""));
        let dest = if rel.as_os_str().is_empty() {
            wrapper.to_path_buf()
        } else {
            ensure_materialized_path(wrapper, source_root, rel)?
        };
        debug!("overlaying {} onto {}", sdk_dir.display(), dest.display());
        copy_tree_over(sdk_dir, &dest)?;
    }
    Ok(targets.len())
}
