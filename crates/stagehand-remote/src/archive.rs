use crate::RemoteError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Zip,
    TarGz,
}

fn sniff(archive: &Path) -> Result<Format, RemoteError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".zip") {
        return Ok(Format::Zip);
    }
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Ok(Format::TarGz);
    }
    let mut magic = [0u8; 4];
    let n = File::open(archive)?.read(&mut magic)?;
    match &magic[..n] {
        [b'P', b'K', 3, 4] | [b'P', b'K', 5, 6] => Ok(Format::Zip),
        [0x1f, 0x8b, ..] => Ok(Format::TarGz),
        _ => Err(RemoteError::Archive(format!(
            "unsupported archive format: {}",
            archive.display()
        ))),
    }
}

/// Unpack a zip or tar.gz into `dest`, refusing entries that escape it.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), RemoteError> {
    fs::create_dir_all(dest)?;
    let format = sniff(archive)?;
    debug!("extracting {} ({format:?}) -> {}", archive.display(), dest.display());
    match format {
        Format::Zip => extract_zip(archive, dest),
        Format::TarGz => extract_tar_gz(archive, dest),
    }
}

fn sanitize_rel_path(path: &Path) -> Result<PathBuf, RemoteError> {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => {
                return Err(RemoteError::Archive(format!(
                    "invalid archive path (absolute): {}",
                    path.display()
                )))
            }
            Component::ParentDir => {
                return Err(RemoteError::Archive(format!(
                    "invalid archive path (..): {}",
                    path.display()
                )))
            }
            Component::CurDir => {}
            Component::Normal(p) => out.push(p),
        }
    }
    Ok(out)
}

fn zip_err(e: zip::result::ZipError) -> RemoteError {
    RemoteError::Archive(e.to_string())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), RemoteError> {
    let mut z = zip::ZipArchive::new(File::open(archive)?).map_err(zip_err)?;
    for i in 0..z.len() {
        let mut file = z.by_index(i).map_err(zip_err)?;
        let rel = sanitize_rel_path(Path::new(file.name()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        ensure_no_symlink_on_path(dest, &rel)?;
        let out_path = dest.join(&rel);
        if file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mode = file.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            file.read_to_string(&mut target)?;
            ensure_link_contained(&rel, Path::new(&target))?;
            write_symlink(&target, &out_path)?;
            continue;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut file, &mut out)?;
        drop(out);
        if let Some(m) = mode {
            set_mode(&out_path, m & 0o777)?;
        }
    }
    Ok(())
}

/// Refuse entries whose path under `dest` runs through an existing symlink.
fn ensure_no_symlink_on_path(dest: &Path, rel: &Path) -> Result<(), RemoteError> {
    let mut cur = dest.to_path_buf();
    let mut parts = rel.components().peekable();
    while let Some(part) = parts.next() {
        cur.push(part);
        let Ok(meta) = fs::symlink_metadata(&cur) else {
            break;
        };
        if !meta.file_type().is_symlink() {
            continue;
        }
        // A link may only be replaced by a later entry of the same name.
        if parts.peek().is_none() {
            fs::remove_file(&cur)?;
            break;
        }
        return Err(RemoteError::Archive(format!(
            "archive entry passes through a symlink: {}",
            rel.display()
        )));
    }
    Ok(())
}

/// A link at `rel` must resolve, lexically, to somewhere inside the extract root.
fn ensure_link_contained(rel: &Path, target: &Path) -> Result<(), RemoteError> {
    let escape = || {
        RemoteError::Archive(format!(
            "symlink escapes the archive root: {} -> {}",
            rel.display(),
            target.display()
        ))
    };
    let mut depth = rel.parent().map_or(0, |p| p.components().count());
    for c in target.components() {
        match c {
            Component::Prefix(_) | Component::RootDir => return Err(escape()),
            Component::ParentDir => depth = depth.checked_sub(1).ok_or_else(escape)?,
            Component::CurDir => {}
            Component::Normal(_) => depth += 1,
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &str, link: &Path) -> Result<(), RemoteError> {
    if Path::new(target).is_absolute() {
        return Err(RemoteError::Archive(format!(
            "absolute symlink target in archive: {} -> {target}",
            link.display()
        )));
    }
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &str, link: &Path) -> Result<(), RemoteError> {
    Err(RemoteError::Archive(format!(
        "symlinks are not supported on this platform: {} -> {target}",
        link.display()
    )))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), RemoteError> {
    use std::os::unix::fs::PermissionsExt;
    if mode != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), RemoteError> {
    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), RemoteError> {
    let mut ar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in ar.entries()? {
        let mut entry = entry?;
        let rel = sanitize_rel_path(&entry.path()?)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        ensure_no_symlink_on_path(dest, &rel)?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let target = entry.link_name()?.map(|t| t.into_owned()).unwrap_or_default();
            if kind.is_hard_link() {
                sanitize_rel_path(&target)?;
            } else {
                ensure_link_contained(&rel, &target)?;
            }
        }
        if !entry.unpack_in(dest)? {
            return Err(RemoteError::Archive(format!(
                "archive entry escapes the destination: {}",
                rel.display()
            )));
        }
    }
    Ok(())
}

/// Unpack every `.zip` sitting at the top of `dir` in place, then delete it.
///
/// CI artifacts often wrap the real bundle in a second zip.
pub fn extract_nested_zips(dir: &Path) -> Result<usize, RemoteError> {
    let mut nested: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect();
    nested.sort();
    for zip in &nested {
        debug!("extracting nested archive {}", zip.display());
        extract_zip(zip, dir)?;
        fs::remove_file(zip)?;
    }
    Ok(nested.len())
}

/// Find the directory inside `extract_dir` that holds the runtime.
///
/// Candidates are `extract_dir` itself and its direct child directories that
/// satisfy `qualifies`. Names containing `version_hint` score 2, names
/// containing `family_hint` score 1; ties go to the extract dir, then by name.
pub fn locate_root(
    extract_dir: &Path,
    qualifies: impl Fn(&Path) -> bool,
    version_hint: &str,
    family_hint: &str,
) -> Option<PathBuf> {
    let mut candidates: Vec<(i32, String, PathBuf)> = Vec::new();
    if qualifies(extract_dir) {
        candidates.push((0, String::new(), extract_dir.to_path_buf()));
    }
    if let Ok(entries) = fs::read_dir(extract_dir) {
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if !path.is_dir() || !qualifies(&path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let lower = name.to_ascii_lowercase();
            let mut score = 0;
            if !version_hint.is_empty() && lower.contains(&version_hint.to_ascii_lowercase()) {
                score += 2;
            }
            if !family_hint.is_empty() && lower.contains(&family_hint.to_ascii_lowercase()) {
                score += 1;
            }
            candidates.push((score, name, path));
        }
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    candidates.into_iter().next().map(|(_, _, p)| p)
}
