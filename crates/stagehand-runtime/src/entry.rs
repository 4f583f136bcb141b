use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What the detection collaborator reports about a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContentEntry {
    /// The path the user picked; keys wrapper and profile identity.
    pub game_path: PathBuf,
    /// Directory holding the guest's files (often `game_path` itself).
    pub content_root: PathBuf,
    pub entry_html: PathBuf,
    /// Stable per-guest identifier, when the host tracks one.
    pub guest_id: Option<String>,
}

impl GuestContentEntry {
    pub fn new(game_path: impl Into<PathBuf>, content_root: impl Into<PathBuf>, entry_html: impl Into<PathBuf>) -> Self {
        Self {
            game_path: game_path.into(),
            content_root: content_root.into(),
            entry_html: entry_html.into(),
            guest_id: None,
        }
    }
}

/// Identifies what kind of guest content a directory holds.
pub trait ContentDetector {
    fn detect(&self, root: &Path) -> Option<GuestContentEntry>;
}

/// Detects plain web guests by their HTML entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebContentDetector;

impl ContentDetector for WebContentDetector {
    fn detect(&self, root: &Path) -> Option<GuestContentEntry> {
        let entry_html = find_index_html(root)?;
        Some(GuestContentEntry::new(root, root, entry_html))
    }
}

pub(crate) fn read_package_json(content_root: &Path) -> Option<serde_json::Map<String, Value>> {
    let raw = fs::read_to_string(content_root.join("package.json")).ok()?;
    match serde_json::from_str(&raw).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// `package.json` `main` when it names an existing `.html`, then
/// `index.html`, then `www/index.html`.
pub fn find_index_html(content_root: &Path) -> Option<PathBuf> {
    if let Some(main) = read_package_json(content_root)
        .as_ref()
        .and_then(|pkg| pkg.get("main"))
        .and_then(Value::as_str)
    {
        let rel = Path::new(main.trim());
        let contained = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        let candidate = content_root.join(rel);
        if contained
            && main.to_ascii_lowercase().ends_with(".html")
            && candidate.is_file()
        {
            return Some(candidate);
        }
    }
    [content_root.join("index.html"), content_root.join("www").join("index.html")]
        .into_iter()
        .find(|p| p.is_file())
}
