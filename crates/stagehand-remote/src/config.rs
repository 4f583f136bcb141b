use serde::{Deserialize, Serialize};

pub const DEFAULT_NWJS_DIST_BASE: &str = "https://dl.nwjs.io";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const NWJS_SITE_VERSIONS: &str = "https://nwjs.io/versions.json";

/// Remote endpoints used by the runtime families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub nwjs_dist_base: String,
    /// Listing URLs tried in order until one yields versions.
    pub nwjs_catalog_sources: Vec<String>,
    pub github_api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let mut config = Self::new(DEFAULT_NWJS_DIST_BASE);
        config.nwjs_catalog_sources.insert(0, NWJS_SITE_VERSIONS.to_owned());
        config
    }
}

impl RemoteConfig {
    /// Endpoints rooted at `dist_base`, with catalog sources derived from it.
    pub fn new(dist_base: &str) -> Self {
        let base = dist_base.trim_end_matches('/').to_owned();
        Self {
            nwjs_catalog_sources: vec![
                format!("{base}/versions.json"),
                format!("{base}/index.json"),
                format!("{base}/"),
            ],
            nwjs_dist_base: base,
            github_api_base: DEFAULT_GITHUB_API_BASE.to_owned(),
            github_token: None,
            user_agent: format!("stagehand/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.github_token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn with_github_api(mut self, base: &str) -> Self {
        self.github_api_base = base.trim_end_matches('/').to_owned();
        self
    }

    /// Fill a missing token from `GITHUB_TOKEN`.
    #[must_use]
    pub fn with_env_token(mut self) -> Self {
        if self.github_token.is_none() {
            self.github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }
        self
    }

    /// `{dist}/v{v}/{nwjs-sdk|nwjs}-v{v}-{platform}.zip`
    pub fn nwjs_download_url(&self, version: &str, platform_key: &str, variant: &str) -> String {
        let flavor = if variant == "sdk" { "nwjs-sdk" } else { "nwjs" };
        format!(
            "{}/v{version}/{flavor}-v{version}-{platform_key}.zip",
            self.nwjs_dist_base
        )
    }
}
