//! Chromium flag strings and inject-script lists in the wrapper manifest.

use serde_json::Value;

/// Flags that keep the runtime's own background traffic off the network.
pub const PROTECTION_FLAGS: [&str; 13] = [
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-domain-reliability",
    "--disable-sync",
    "--disable-translate",
    "--dns-prefetch-disable",
    "--no-pings",
    "--proxy-server=127.0.0.1:9",
    "--proxy-bypass-list=<-loopback>",
    "--safebrowsing-disable-auto-update",
    "--safebrowsing-disable-download-protection",
];

/// Append each addition unless its text already occurs in the flag string.
pub fn append_flags<S: AsRef<str>>(existing: &str, additions: &[S]) -> String {
    let mut next = existing.trim().to_owned();
    for arg in additions {
        let value = arg.as_ref().trim();
        if value.is_empty() || next.contains(value) {
            continue;
        }
        if !next.is_empty() {
            next.push(' ');
        }
        next.push_str(value);
    }
    next
}

/// Remove every `--disable-devtools` / `--disable-devtools=...` token.
pub fn strip_disable_devtools(value: &str) -> String {
    value
        .split_whitespace()
        .filter(|tok| *tok != "--disable-devtools" && !tok.starts_with("--disable-devtools="))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge protection flags (when enabled) and caller flags into `existing`.
///
/// Returns `None` when nothing is left, so the key can be dropped.
pub fn merge_flags(existing: Option<&str>, protections: bool, extra: &[String]) -> Option<String> {
    let mut merged = existing.unwrap_or_default().trim().to_owned();
    if protections {
        merged = append_flags(&merged, &PROTECTION_FLAGS);
    }
    if !extra.is_empty() {
        merged = append_flags(&merged, extra);
    }
    let merged = strip_disable_devtools(&merged);
    (!merged.is_empty()).then_some(merged)
}

/// A manifest inject entry may be a string or a list of strings.
pub fn inject_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::String(_)) => vec![v],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Keep the first occurrence of each entry.
pub fn dedupe(list: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in list {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
