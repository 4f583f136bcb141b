use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a family spells its version strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionGrammar {
    /// Dotted numeric triple, `X.Y.Z`, with an optional leading `v`.
    Semver,
    /// `YYYY-MM-DDTHH-MM-SSZ_<hash>` build tokens.
    DateHash,
}

/// Identifier of a supported runtime family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyId {
    Nwjs,
    Greenworks,
    Mkxpz,
}

impl FamilyId {
    pub const ALL: [FamilyId; 3] = [FamilyId::Nwjs, FamilyId::Greenworks, FamilyId::Mkxpz];

    pub fn as_str(self) -> &'static str {
        match self {
            FamilyId::Nwjs => "nwjs",
            FamilyId::Greenworks => "greenworks",
            FamilyId::Mkxpz => "mkxpz",
        }
    }

    pub fn descriptor(self) -> &'static RuntimeFamily {
        match self {
            FamilyId::Nwjs => &NWJS,
            FamilyId::Greenworks => &GREENWORKS,
            FamilyId::Mkxpz => &MKXPZ,
        }
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FamilyId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nwjs" | "nw.js" | "nw" => Ok(FamilyId::Nwjs),
            "greenworks" => Ok(FamilyId::Greenworks),
            "mkxpz" | "mkxp-z" => Ok(FamilyId::Mkxpz),
            other => Err(SchemaError::UnknownFamily(other.to_owned())),
        }
    }
}

/// Compile-time description of one runtime family.
#[derive(Debug, Serialize)]
pub struct RuntimeFamily {
    pub id: FamilyId,
    pub label: &'static str,
    pub grammar: VersionGrammar,
    /// Installs are keyed by platform key (`<version>/<platform>/<variant>`).
    pub has_platforms: bool,
    /// Accepted variant names; empty when the family has no variant dimension.
    pub variants: &'static [&'static str],
    pub default_version: Option<&'static str>,
}

impl RuntimeFamily {
    pub fn default_variant(&self) -> Option<&'static str> {
        self.variants.first().copied()
    }
}

pub static NWJS: RuntimeFamily = RuntimeFamily {
    id: FamilyId::Nwjs,
    label: "NW.js",
    grammar: VersionGrammar::Semver,
    has_platforms: true,
    variants: &["sdk"],
    default_version: Some("0.107.0"),
};

pub static GREENWORKS: RuntimeFamily = RuntimeFamily {
    id: FamilyId::Greenworks,
    label: "Greenworks",
    grammar: VersionGrammar::Semver,
    has_platforms: false,
    variants: &[],
    default_version: None,
};

pub static MKXPZ: RuntimeFamily = RuntimeFamily {
    id: FamilyId::Mkxpz,
    label: "MKXP-Z",
    grammar: VersionGrammar::DateHash,
    has_platforms: false,
    variants: &[],
    default_version: None,
};
