//! The reported state of a family: persisted settings plus the ephemeral
//! install and catalog blocks, which are never written back.

use serde::Serialize;
use stagehand_schema::{
    compare_versions, version_label, CatalogState, FamilyId, FamilySettings, InstallState,
    InstalledRuntime, VersionGrammar,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogReport {
    #[serde(flatten)]
    pub state: CatalogState,
    pub latest_available_version: Option<String>,
    pub latest_installed_version: Option<String>,
    pub update_available: bool,
    /// Short labels for date-hash versions, keyed by version.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyReport {
    pub family: FamilyId,
    pub label: &'static str,
    pub settings: FamilySettings,
    pub installed: Vec<InstalledRuntime>,
    pub installing: Option<InstallState>,
    pub catalog: CatalogReport,
}

impl CatalogReport {
    pub fn build(
        family: FamilyId,
        state: CatalogState,
        settings: &FamilySettings,
        installed: &[InstalledRuntime],
    ) -> Self {
        let grammar = family.descriptor().grammar;
        let latest_available_version = state.latest().map(str::to_owned);
        let latest_installed_version = installed
            .iter()
            .max_by(|a, b| compare_versions(grammar, &a.version, &b.version))
            .map(|r| r.version.clone());
        let update_available = match (
            latest_available_version.as_deref(),
            settings.default_version.as_deref(),
        ) {
            (Some(latest), Some(current)) => compare_versions(grammar, latest, current) == Ordering::Greater,
            _ => false,
        };

        let mut labels = BTreeMap::new();
        if grammar == VersionGrammar::DateHash {
            let all = state
                .versions
                .iter()
                .map(String::as_str)
                .chain(installed.iter().map(|r| r.version.as_str()));
            for v in all {
                labels.insert(v.to_owned(), version_label(grammar, v));
            }
        }

        Self {
            state,
            latest_available_version,
            latest_installed_version,
            update_available,
            labels,
        }
    }
}
