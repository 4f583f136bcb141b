//! NW.js version listings.
//!
//! A listing is either JSON (several shapes seen in the wild) or an HTML
//! directory index. Sources are tried in order until one yields a version.

use crate::http::{HttpClient, RequestSpec};
use crate::RemoteError;
use regex::Regex;
use serde_json::Value;
use stagehand_schema::{sort_desc, VersionGrammar};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Versions parsed from one listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFetch {
    /// Newest first, deduplicated.
    pub versions: Vec<String>,
    /// The URL that produced them.
    pub source: String,
}

fn strict_semver() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid regex"))
}

fn href_version() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href=["']v?(\d+\.\d+\.\d+)/["']"#).expect("valid regex"))
}

pub fn is_json_response(url: &str, content_type: Option<&str>) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".json")
        || content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn push_version(out: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    let v = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if strict_semver().is_match(v) {
        out.push(v.to_owned());
    }
}

/// Collect versions from an array of strings, an array of objects carrying
/// `version`/`name`/`tag_name`, or an object wrapping either under
/// `versions`, `data` or `items`.
pub fn versions_from_json(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            match ["versions", "data", "items"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array))
            {
                Some(items) => items,
                None => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    let mut out = Vec::new();
    for item in items {
        match item {
            Value::String(s) => push_version(&mut out, s),
            Value::Object(obj) => {
                if let Some(s) = ["version", "name", "tag_name"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                {
                    push_version(&mut out, s);
                }
            }
            _ => {}
        }
    }
    out
}

pub fn versions_from_html(body: &str) -> Vec<String> {
    href_version()
        .captures_iter(body)
        .map(|c| c[1].to_owned())
        .collect()
}

/// Parse one listing body. An empty result is an error so callers move on.
pub fn parse_catalog_body(
    url: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Vec<String>, RemoteError> {
    let mut versions = if is_json_response(url, content_type) {
        let value: Value = serde_json::from_slice(body)?;
        versions_from_json(&value)
    } else {
        versions_from_html(&String::from_utf8_lossy(body))
    };
    sort_desc(VersionGrammar::Semver, &mut versions);
    if versions.is_empty() {
        return Err(RemoteError::NoVersions(url.to_owned()));
    }
    Ok(versions)
}

/// Try each source in order; the first non-empty listing wins.
pub fn fetch_first_listing(
    client: &HttpClient,
    sources: &[String],
) -> Result<CatalogFetch, RemoteError> {
    let mut last_err = None;
    for source in sources {
        debug!("catalog source: {source}");
        let attempt = client
            .get_bytes(source, RequestSpec::default())
            .and_then(|f| parse_catalog_body(&f.url, f.content_type.as_deref(), &f.body));
        match attempt {
            Ok(versions) => {
                debug!("{} versions from {source}", versions.len());
                return Ok(CatalogFetch {
                    versions,
                    source: source.clone(),
                });
            }
            Err(e) => {
                warn!("catalog source {source} failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| RemoteError::NoVersions("(no catalog sources)".to_owned())))
}
