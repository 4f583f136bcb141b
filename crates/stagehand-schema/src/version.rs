//! Version normalization and ordering per [`VersionGrammar`].
//!
//! Semver triples compare numerically; date-hash tokens compare by their
//! parsed timestamp. Both fall back to lexical order when either side does not
//! parse, so sorting never fails on malformed input.

use crate::family::{RuntimeFamily, VersionGrammar};
use crate::SchemaError;
use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Validate and canonicalize a user-supplied version for `family`.
pub fn normalize_version(family: &RuntimeFamily, input: &str) -> Result<String, SchemaError> {
    let invalid = || SchemaError::InvalidVersion {
        family: family.label,
        input: input.to_owned(),
    };
    match family.grammar {
        VersionGrammar::Semver => {
            let v = strip_v(input.trim());
            parse_semver(v).ok_or_else(invalid)?;
            Ok(v.to_owned())
        }
        VersionGrammar::DateHash => {
            let v = input.trim();
            // Tokens name a directory, so "." and ".." style values are out.
            if v.is_empty() || v.starts_with('.') || !v.chars().all(is_token_char) {
                return Err(invalid());
            }
            Ok(v.to_owned())
        }
    }
}

/// Accepts a version if it normalizes, for filtering directory listings.
pub fn is_valid_version(family: &RuntimeFamily, input: &str) -> bool {
    normalize_version(family, input).is_ok_and(|v| v == input)
}

fn strip_v(s: &str) -> &str {
    s.strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Parse a strict `X.Y.Z` triple (leading `v` tolerated).
pub fn parse_semver(s: &str) -> Option<(u64, u64, u64)> {
    let mut parts = strip_v(s.trim()).split('.');
    let mut next = || -> Option<u64> {
        let p = parts.next()?;
        if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        p.parse().ok()
    };
    let triple = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(triple)
}

/// Find the first `X.Y.Z` run inside a longer string such as a release tag.
pub fn extract_semver(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if bytes[start].is_ascii_digit() && (start == 0 || !bytes[start - 1].is_ascii_digit()) {
            let mut end = start;
            let mut dots = 0;
            while end < bytes.len() {
                let b = bytes[end];
                if b.is_ascii_digit() {
                    end += 1;
                } else if b == b'.'
                    && dots < 2
                    && end + 1 < bytes.len()
                    && bytes[end + 1].is_ascii_digit()
                {
                    dots += 1;
                    end += 1;
                } else {
                    break;
                }
            }
            if dots == 2 {
                return Some(s[start..end].to_owned());
            }
            start = end.max(start + 1);
        } else {
            start += 1;
        }
    }
    None
}

/// Parse the leading `YYYY-MM-DDTHH-MM-SSZ` of a date-hash token.
pub fn parse_version_date(version: &str) -> Option<NaiveDateTime> {
    let head = version.split('_').next()?;
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H-%M-%SZ").ok()
}

/// Ascending comparison under `grammar`.
pub fn compare_versions(grammar: VersionGrammar, a: &str, b: &str) -> Ordering {
    match grammar {
        VersionGrammar::Semver => match (parse_semver(a), parse_semver(b)) {
            (Some(pa), Some(pb)) => pa.cmp(&pb),
            _ => a.cmp(b),
        },
        VersionGrammar::DateHash => match (parse_version_date(a), parse_version_date(b)) {
            (Some(da), Some(db)) if da != db => da.cmp(&db),
            _ => a.cmp(b),
        },
    }
}

/// Deduplicate and sort newest first.
pub fn sort_desc(grammar: VersionGrammar, versions: &mut Vec<String>) {
    versions.sort_by(|a, b| compare_versions(grammar, b, a));
    versions.dedup();
}

/// Short display label; date-hash tokens render as `YYYYMMDD`.
pub fn version_label(grammar: VersionGrammar, version: &str) -> String {
    match grammar {
        VersionGrammar::Semver => version.to_owned(),
        VersionGrammar::DateHash => parse_version_date(version)
            .map_or_else(|| version.to_owned(), |d| d.format("%Y%m%d").to_string()),
    }
}

/// Make an arbitrary string safe to use as one path segment of a version token.
pub fn sanitize_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_bad_run = false;
    for c in value.trim().chars() {
        if matches!(c, ':' | '/' | '\\') {
            out.push('-');
            in_bad_run = false;
        } else if is_token_char(c) {
            out.push(c);
            in_bad_run = false;
        } else if !in_bad_run {
            out.push('_');
            in_bad_run = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{MKXPZ, NWJS};

    #[test]
    fn semver_strips_leading_v() {
        assert_eq!(normalize_version(&NWJS, " v0.80.0 ").unwrap(), "0.80.0");
    }

    #[test]
    fn semver_rejects_garbage_before_io() {
        for bad in ["", "0.80", "0.80.0.1", "latest", "0.x.1", "1..2"] {
            let err = normalize_version(&NWJS, bad).unwrap_err();
            assert!(
                err.to_string().contains("Invalid NW.js version"),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn date_hash_accepts_token_chars_only() {
        assert!(normalize_version(&MKXPZ, "2026-01-12T18-22-32Z_794d18").is_ok());
        assert!(normalize_version(&MKXPZ, "a b").is_err());
        assert!(normalize_version(&MKXPZ, "   ").is_err());
        assert!(normalize_version(&MKXPZ, "../etc").is_err());
    }

    #[test]
    fn date_hash_rejects_dot_only_and_hidden_tokens() {
        for bad in [".", "..", "...", ".hidden", " .. "] {
            assert!(normalize_version(&MKXPZ, bad).is_err(), "{bad:?}");
            assert!(!is_valid_version(&MKXPZ, bad), "{bad:?}");
        }
        assert_eq!(normalize_version(&MKXPZ, "nightly.2").unwrap(), "nightly.2");
    }

    #[test]
    fn semver_compares_numerically() {
        assert_eq!(
            compare_versions(VersionGrammar::Semver, "0.9.0", "0.10.0"),
            Ordering::Less
        );
        assert_eq!(
            compare_versions(VersionGrammar::Semver, "1.0.0", "1.0.0"),
            Ordering::Equal
        );
    }

    #[test]
    fn semver_falls_back_to_lexical_for_malformed() {
        assert_eq!(
            compare_versions(VersionGrammar::Semver, "beta", "alpha"),
            Ordering::Greater
        );
    }

    #[test]
    fn date_hash_compares_by_date() {
        let older = "2025-12-31T23-59-59Z_ffff";
        let newer = "2026-01-01T00-00-00Z_0000";
        assert_eq!(
            compare_versions(VersionGrammar::DateHash, older, newer),
            Ordering::Less
        );
    }

    #[test]
    fn date_hash_same_date_falls_back_to_lexical() {
        let a = "2026-01-01T00-00-00Z_aaaa";
        let b = "2026-01-01T00-00-00Z_bbbb";
        assert_eq!(
            compare_versions(VersionGrammar::DateHash, a, b),
            Ordering::Less
        );
    }

    #[test]
    fn sort_desc_dedupes() {
        let mut v = vec![
            "0.79.0".to_owned(),
            "0.80.0".to_owned(),
            "0.79.0".to_owned(),
            "0.100.0".to_owned(),
        ];
        sort_desc(VersionGrammar::Semver, &mut v);
        assert_eq!(v, vec!["0.100.0", "0.80.0", "0.79.0"]);
    }

    #[test]
    fn extract_semver_from_tags() {
        assert_eq!(extract_semver("v0.4.0").as_deref(), Some("0.4.0"));
        assert_eq!(
            extract_semver("greenworks-v0.15.0-nw-v0.72.0-osx.zip").as_deref(),
            Some("0.15.0")
        );
        assert_eq!(extract_semver("release-2"), None);
    }

    #[test]
    fn date_hash_label() {
        assert_eq!(
            version_label(VersionGrammar::DateHash, "2026-01-12T18-22-32Z_794d"),
            "20260112"
        );
        assert_eq!(version_label(VersionGrammar::DateHash, "custom"), "custom");
    }

    #[test]
    fn sanitize_segment_maps_separators_and_junk() {
        assert_eq!(sanitize_segment("2026-01-12T18:22:32Z"), "2026-01-12T18-22-32Z");
        assert_eq!(sanitize_segment("  a b  c "), "a_b_c");
        assert_eq!(sanitize_segment("***"), "unknown");
    }
}
