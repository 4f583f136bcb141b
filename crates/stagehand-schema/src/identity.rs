use crate::types::StableId;
use std::path::Path;

/// Stable identifier for a guest, derived from its path.
///
/// The first 12 hex characters of the blake3 hash of the path string. The
/// same path always yields the same id, across processes and releases.
pub fn stable_id(game_path: impl AsRef<Path>) -> StableId {
    let raw = game_path.as_ref().to_string_lossy();
    let hex = blake3::hash(raw.as_bytes()).to_hex();
    StableId::new(&hex.as_str()[..12])
}
