//! Remote distribution access for Stagehand runtime families.
//!
//! This crate provides an HTTP client with bounded manual redirects and
//! streaming downloads (`HttpClient`), version catalog parsing for JSON and
//! HTML listings, GitHub release and Actions artifact listing, archive
//! extraction with root location, and remote endpoint configuration.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod github;
pub mod http;
#[cfg(any(test, feature = "test-server"))]
pub mod testing;

pub use archive::{extract_archive, extract_nested_zips, locate_root};
pub use catalog::{fetch_first_listing, parse_catalog_body, CatalogFetch};
pub use config::RemoteConfig;
pub use github::{Artifact, GitHubApi, Release, ReleaseAsset, WorkflowRun};
pub use http::{Fetched, HttpClient, RequestSpec};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {code} for {url}")]
    Status { code: u16, url: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("too many redirects (limit {limit}) while fetching {url}")]
    TooManyRedirects { url: String, limit: u32 },
    #[error("redirect missing location: {0}")]
    MissingLocation(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("No versions found at {0}")]
    NoVersions(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_url() {
        let e = RemoteError::Status {
            code: 503,
            url: "https://dl.example/x".to_owned(),
        };
        assert_eq!(e.to_string(), "HTTP 503 for https://dl.example/x");
    }

    #[test]
    fn redirect_error_names_limit() {
        let e = RemoteError::TooManyRedirects {
            url: "http://a/".to_owned(),
            limit: 5,
        };
        assert!(e.to_string().contains("limit 5"));
    }

    #[test]
    fn not_found_is_detectable() {
        assert!(RemoteError::NotFound("x".to_owned()).is_not_found());
        assert!(!RemoteError::Http("x".to_owned()).is_not_found());
    }
}
