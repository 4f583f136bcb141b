//! GitHub REST listings: releases (Greenworks) and Actions artifacts (MKXP-Z).

use crate::http::{HttpClient, RequestSpec};
use crate::RemoteError;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use stagehand_schema::{compare_versions, extract_semver, parse_semver, sort_desc, VersionGrammar};
use std::cmp::Ordering;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Semver triple from the tag, else from the release name.
    pub fn semver(&self) -> Option<String> {
        std::iter::once(self.tag_name.as_str())
            .chain(self.name.as_deref())
            .find_map(|s| {
                let s = s.trim();
                let s = s.strip_prefix('v').unwrap_or(s);
                parse_semver(s).map(|_| s.to_owned()).or_else(|| extract_semver(s))
            })
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        self.published_at.or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.run_started_at.or(self.created_at).or(self.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    pub archive_download_url: String,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Deserialize)]
struct RunsPage {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct ArtifactsPage {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        pieces
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"")
            .then(|| url.to_owned())
    })
}

pub fn is_darwin_asset(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["osx", "darwin", "mac"].iter().any(|n| lower.contains(n))
}

fn nw_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r"nw-v?(\d+\.\d+\.\d+)")
            .case_insensitive(true)
            .build()
            .expect("valid regex")
    })
}

/// NW.js versions that have a macOS Greenworks build, newest first.
pub fn greenworks_nw_versions(releases: &[Release]) -> Vec<String> {
    let mut out: Vec<String> = releases
        .iter()
        .flat_map(|r| &r.assets)
        .filter(|a| is_darwin_asset(&a.name))
        .filter_map(|a| nw_tag().captures(&a.name).map(|c| c[1].to_owned()))
        .collect();
    sort_desc(VersionGrammar::Semver, &mut out);
    out
}

/// Newest release first: by semver when both parse, else by date.
pub fn sort_releases(releases: &mut [Release]) {
    releases.sort_by(|a, b| match (a.semver(), b.semver()) {
        (Some(va), Some(vb)) => compare_versions(VersionGrammar::Semver, &vb, &va),
        _ => match (a.date(), b.date()) {
            (Some(da), Some(db)) => db.cmp(&da),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreenworksMatch {
    /// Greenworks' own version, from the release tag.
    pub release_version: Option<String>,
    pub asset: ReleaseAsset,
}

/// Pick the macOS asset built against `nw_version` from the newest release that has one.
pub fn select_greenworks_asset(releases: &[Release], nw_version: &str) -> Option<GreenworksMatch> {
    let needle = RegexBuilder::new(&format!(r"nw-v?{}(?:[^0-9]|$)", regex::escape(nw_version)))
        .case_insensitive(true)
        .build()
        .ok()?;
    let mut sorted = releases.to_vec();
    sort_releases(&mut sorted);
    sorted.into_iter().find_map(|release| {
        let asset = release
            .assets
            .iter()
            .find(|a| is_darwin_asset(&a.name) && needle.is_match(&a.name))?
            .clone();
        Some(GreenworksMatch {
            release_version: release.semver(),
            asset,
        })
    })
}

/// Thin GitHub REST client over [`HttpClient`].
pub struct GitHubApi<'a> {
    http: &'a HttpClient,
    base: String,
    token: Option<String>,
}

impl<'a> GitHubApi<'a> {
    pub fn new(http: &'a HttpClient, base: &str, token: Option<String>) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
            token,
        }
    }

    pub fn spec(&self) -> RequestSpec<'_> {
        RequestSpec {
            accept: Some(ACCEPT),
            bearer: self.token.as_deref(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base)
            .map_err(|e| RemoteError::Http(format!("invalid GitHub API base {}: {e}", self.base)))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Http(format!("GitHub API base cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_segments(repo: &str) -> Result<(&str, &str), RemoteError> {
        repo.split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| RemoteError::Http(format!("invalid repository '{repo}', expected owner/name")))
    }

    /// Published, non-draft, non-prerelease releases, following `Link` pagination.
    pub fn list_releases(&self, repo: &str, max_pages: usize) -> Result<Vec<Release>, RemoteError> {
        let (owner, name) = Self::repo_segments(repo)?;
        let mut url = self.endpoint(&["repos", owner, name, "releases"])?;
        url.query_pairs_mut().append_pair("per_page", "100");

        let mut next = Some(url.to_string());
        let mut out = Vec::new();
        let mut pages = 0;
        while let Some(page_url) = next.take() {
            if pages >= max_pages {
                break;
            }
            pages += 1;
            let (page, fetched): (Vec<Release>, _) = self.http.get_json(&page_url, self.spec())?;
            debug!("{repo}: {} releases on page {pages}", page.len());
            out.extend(page.into_iter().filter(|r| !r.draft && !r.prerelease));
            next = fetched.link.as_deref().and_then(parse_next_link);
        }
        Ok(out)
    }

    /// Successful runs of `workflow` on `branch`, newest first.
    pub fn list_runs(
        &self,
        repo: &str,
        workflow: &str,
        branch: &str,
        per_page: u32,
    ) -> Result<Vec<WorkflowRun>, RemoteError> {
        let (owner, name) = Self::repo_segments(repo)?;
        let mut url = self.endpoint(&["repos", owner, name, "actions", "workflows", workflow, "runs"])?;
        url.query_pairs_mut()
            .append_pair("branch", branch)
            .append_pair("status", "success")
            .append_pair("per_page", &per_page.to_string());
        let (page, _): (RunsPage, _) = self.http.get_json(url.as_str(), self.spec())?;
        let mut runs = page.workflow_runs;
        runs.sort_by(|a, b| b.date().cmp(&a.date()));
        Ok(runs)
    }

    pub fn list_artifacts(&self, repo: &str, run_id: u64) -> Result<Vec<Artifact>, RemoteError> {
        let (owner, name) = Self::repo_segments(repo)?;
        let id = run_id.to_string();
        let mut url = self.endpoint(&["repos", owner, name, "actions", "runs", &id, "artifacts"])?;
        url.query_pairs_mut().append_pair("per_page", "100");
        let (page, _): (ArtifactsPage, _) = self.http.get_json(url.as_str(), self.spec())?;
        Ok(page.artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, TestServer};
    use serde_json::json;
    use std::sync::Arc;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_owned(),
            browser_download_url: format!("https://dl.example/{name}"),
            size: 1,
        }
    }

    fn release(tag: &str, assets: &[&str]) -> Release {
        Release {
            tag_name: tag.to_owned(),
            name: None,
            draft: false,
            prerelease: false,
            published_at: None,
            created_at: None,
            assets: assets.iter().map(|a| asset(a)).collect(),
        }
    }

    #[test]
    fn next_link_is_found_among_rels() {
        let header = r#"<https://api.github.com/x?page=1>; rel="prev", <https://api.github.com/x?page=3>; rel="next""#;
        assert_eq!(parse_next_link(header).as_deref(), Some("https://api.github.com/x?page=3"));
        assert_eq!(parse_next_link(r#"<https://a/>; rel="last""#), None);
    }

    #[test]
    fn darwin_asset_names() {
        assert!(is_darwin_asset("greenworks-v0.15.0-nw-v0.72.0-OSX.zip"));
        assert!(is_darwin_asset("foo-macos.zip"));
        assert!(!is_darwin_asset("greenworks-nw-v0.72.0-win64.zip"));
    }

    #[test]
    fn nw_versions_from_darwin_assets_only() {
        let releases = vec![
            release("v0.15.0", &["greenworks-nw-v0.72.0-osx.zip", "greenworks-nw-v0.73.0-win.zip"]),
            release("v0.14.0", &["greenworks-NW-0.60.0-darwin.zip", "greenworks-nw-v0.72.0-mac.zip"]),
        ];
        assert_eq!(greenworks_nw_versions(&releases), vec!["0.72.0", "0.60.0"]);
    }

    #[test]
    fn newest_release_wins_asset_selection() {
        let releases = vec![
            release("v0.9.0", &["greenworks-nw-v0.72.0-osx.zip"]),
            release("v0.15.0", &["greenworks-nw-v0.72.0-osx.zip", "greenworks-nw-v0.72.01-osx.zip"]),
        ];
        let m = select_greenworks_asset(&releases, "0.72.0").unwrap();
        assert_eq!(m.release_version.as_deref(), Some("0.15.0"));
        assert_eq!(m.asset.name, "greenworks-nw-v0.72.0-osx.zip");
        assert!(select_greenworks_asset(&releases, "0.99.0").is_none());
    }

    #[test]
    fn version_needle_does_not_match_longer_versions() {
        let releases = vec![release("v1.0.0", &["greenworks-nw-v0.72.01-osx.zip"])];
        assert!(select_greenworks_asset(&releases, "0.72.0").is_none());
    }

    #[test]
    fn releases_follow_next_links_and_drop_drafts() {
        let base: Arc<OnceLock<String>> = Arc::default();
        let base_in = Arc::clone(&base);
        let server = TestServer::start(move |path| {
            if !path.starts_with("/repos/o/r/releases") {
                return Reply::status(404);
            }
            if path.contains("page=2") {
                Reply::json(&json!([{"tag_name": "v2"}, {"tag_name": "v3", "prerelease": true}]))
            } else {
                let next = format!(
                    "<{}/repos/o/r/releases?per_page=100&page=2>; rel=\"next\"",
                    base_in.get().map_or("", String::as_str)
                );
                Reply::json(&json!([{"tag_name": "v1"}, {"tag_name": "v0", "draft": true}]))
                    .with_header("Link", &next)
            }
        });
        base.set(server.url.clone()).unwrap();
        let http = HttpClient::new("t");
        let api = GitHubApi::new(&http, &server.url, None);

        let tags: Vec<String> = api
            .list_releases("o/r", 5)
            .unwrap()
            .into_iter()
            .map(|r| r.tag_name)
            .collect();
        assert_eq!(tags, vec!["v1", "v2"]);

        let first_page_only = api.list_releases("o/r", 1).unwrap();
        assert_eq!(first_page_only.len(), 1);
    }

    #[test]
    fn runs_and_artifacts_use_rest_paths() {
        let server = TestServer::start(|path| {
            if path.starts_with("/repos/mkxp-z/mkxp-z/actions/workflows/autobuild.yml/runs") {
                if !(path.contains("branch=dev") && path.contains("status=success")) {
                    return Reply::status(400);
                }
                Reply::json(&json!({"workflow_runs": [
                    {"id": 1, "head_sha": "aaa", "created_at": "2025-01-01T00:00:00Z"},
                    {"id": 2, "head_sha": "bbb", "run_started_at": "2026-01-12T18:22:32Z"}
                ]}))
            } else if path.starts_with("/repos/mkxp-z/mkxp-z/actions/runs/2/artifacts") {
                Reply::json(&json!({"artifacts": [
                    {"id": 9, "name": "mkxp-z-macos", "archive_download_url": "https://x/zip"}
                ]}))
            } else {
                Reply::status(404)
            }
        });
        let http = HttpClient::new("t");
        let api = GitHubApi::new(&http, &server.url, Some("tok".to_owned()));
        let runs = api.list_runs("mkxp-z/mkxp-z", "autobuild.yml", "dev", 10).unwrap();
        assert_eq!(runs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        let artifacts = api.list_artifacts("mkxp-z/mkxp-z", 2).unwrap();
        assert_eq!(artifacts[0].name, "mkxp-z-macos");
    }

    #[test]
    fn bad_repo_is_rejected() {
        let http = HttpClient::new("t");
        let api = GitHubApi::new(&http, "https://api.github.com", None);
        assert!(api.list_releases("noslash", 1).is_err());
    }
}
