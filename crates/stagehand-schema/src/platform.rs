use crate::family::RuntimeFamily;
use crate::types::PlatformKey;
use crate::SchemaError;
use serde::Serialize;

/// CPU architecture of the host running the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostArch {
    Arm64,
    X64,
}

impl HostArch {
    pub fn detect() -> Self {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    pub fn from_rust_arch(arch: &str) -> Self {
        match arch {
            "aarch64" | "arm64" => HostArch::Arm64,
            _ => HostArch::X64,
        }
    }

    /// Platform keys to try, most native first.
    ///
    /// An arm64 host can run x64 builds under translation, so both are
    /// candidates there; an x64 host only accepts x64 builds.
    pub fn platform_keys(self) -> Vec<PlatformKey> {
        match self {
            HostArch::Arm64 => vec![PlatformKey::new("osx-arm64"), PlatformKey::new("osx-x64")],
            HostArch::X64 => vec![PlatformKey::new("osx-x64")],
        }
    }

    /// Whether a build for `key` must be started through the translation shim.
    pub fn needs_translation(self, key: &PlatformKey) -> bool {
        self == HostArch::Arm64 && key.as_str() == "osx-x64"
    }
}

/// Resolve a requested variant against the family's accepted set.
///
/// `normal` is an accepted alias of the SDK build; every NW.js install uses
/// the SDK flavor.
pub fn normalize_variant(
    family: &RuntimeFamily,
    input: Option<&str>,
) -> Result<Option<String>, SchemaError> {
    let Some(default) = family.default_variant() else {
        return Ok(None);
    };
    let raw = input.map(str::trim).unwrap_or_default().to_ascii_lowercase();
    if raw.is_empty() || raw == "normal" || family.variants.contains(&raw.as_str()) {
        return Ok(Some(default.to_owned()));
    }
    Err(SchemaError::InvalidVariant {
        family: family.label,
        input: input.unwrap_or_default().to_owned(),
    })
}
