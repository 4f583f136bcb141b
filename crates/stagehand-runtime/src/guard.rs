//! Cooperative sandbox guard.
//!
//! The guard itself runs inside the guest process as injected scripts; this
//! module renders those scripts and carries [`GuardPolicy`], the same
//! allow/deny decision expressed in Rust.

use thiserror::Error;
use url::{Host, Url};

/// The only hosts guest code may reach.
pub const LOOPBACK_HOSTS: [&str; 3] = ["127.0.0.1", "::1", "localhost"];

pub const ERR_NET_BLOCKED: &str = "ERR_NET_BLOCKED";
pub const ERR_SPAWN_BLOCKED: &str = "ERR_SPAWN_BLOCKED";

const GUARDED_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

const DISABLE_CHILD_JS: &str = include_str!("scripts/disable-child.js");
const DISABLE_NET_JS: &str = include_str!("scripts/disable-net.js");
const OFFLINE_JS: &str = include_str!("scripts/offline.js");
const BG_JS: &str = include_str!("scripts/bg.js");
const START_JS: &str = include_str!("scripts/start.js");
const END_JS: &str = include_str!("scripts/end.js");
const DEVTOOLS_JS: &str = include_str!("scripts/devtools.js");
const CASE_INSENSITIVE_JS: &str = include_str!("scripts/case-insensitive-nw.js");
const LOADER_JS: &str = include_str!("scripts/loader.js");
const INJECT_JS: &str = include_str!("scripts/inject.js");

const ALLOW_HOSTS_SLOT: &str = "/*ALLOW_HOSTS*/";
const DEVTOOLS_SLOT: &str = "/*DEVTOOLS_HELPER*/";

/// What the in-guest guard raises when it blocks a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxViolation {
    #[error("Outbound network disabled: {reason}")]
    Network { reason: String },
    #[error("Blocked: child_process.{call}")]
    Spawn { call: String },
}

impl SandboxViolation {
    pub fn code(&self) -> &'static str {
        match self {
            SandboxViolation::Network { .. } => ERR_NET_BLOCKED,
            SandboxViolation::Spawn { .. } => ERR_SPAWN_BLOCKED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPolicy {
    allow_hosts: Vec<String>,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            allow_hosts: LOOPBACK_HOSTS.iter().map(|h| (*h).to_owned()).collect(),
        }
    }
}

fn bare_host(host: &str) -> String {
    let h = host.trim().to_ascii_lowercase();
    h.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .map_or_else(|| h.clone(), str::to_owned)
}

impl GuardPolicy {
    pub fn allow_hosts(&self) -> &[String] {
        &self.allow_hosts
    }

    pub fn check_host(&self, host: &str) -> Result<(), SandboxViolation> {
        let bare = bare_host(host);
        if !bare.is_empty() && self.allow_hosts.iter().any(|h| *h == bare) {
            return Ok(());
        }
        Err(SandboxViolation::Network {
            reason: format!("connect to {host}"),
        })
    }

    /// Decide a page-level request. Relative or non-network URLs are not the
    /// guard's concern and pass.
    pub fn check_url(&self, raw: &str) -> Result<(), SandboxViolation> {
        let Ok(url) = Url::parse(raw.trim()) else {
            return Ok(());
        };
        if !GUARDED_SCHEMES.contains(&url.scheme()) {
            return Ok(());
        }
        let host = match url.host() {
            Some(Host::Domain(d)) => d.to_ascii_lowercase(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Ok(()),
        };
        if self.allow_hosts.iter().any(|h| *h == host) {
            return Ok(());
        }
        Err(SandboxViolation::Network {
            reason: format!("fetch {raw}"),
        })
    }

    /// Process spawning has no allowlist.
    pub fn check_spawn(&self, call: &str) -> Result<(), SandboxViolation> {
        Err(SandboxViolation::Spawn {
            call: call.to_owned(),
        })
    }

    fn hosts_literal(&self) -> String {
        serde_json::to_string(&self.allow_hosts).unwrap_or_else(|_| "[]".to_owned())
    }

    pub fn render_disable_net(&self) -> String {
        DISABLE_NET_JS.replace(ALLOW_HOSTS_SLOT, &self.hosts_literal())
    }

    pub fn render_offline(&self) -> String {
        OFFLINE_JS.replace(ALLOW_HOSTS_SLOT, &self.hosts_literal())
    }
}

pub fn render_disable_child() -> &'static str {
    DISABLE_CHILD_JS
}

pub fn render_bg() -> &'static str {
    BG_JS
}

/// The start script, with the devtools helper prepended when requested.
pub fn render_start(devtools: bool) -> String {
    START_JS.replace(DEVTOOLS_SLOT, if devtools { DEVTOOLS_JS } else { "" })
}

pub fn render_end() -> &'static str {
    END_JS
}

pub fn render_case_insensitive() -> &'static str {
    CASE_INSENSITIVE_JS
}

/// Reads `patch.json` and loads patch scripts, modules and user scripts.
pub fn render_loader() -> &'static str {
    LOADER_JS
}

/// Loads the host-supplied cheats file named in the manifest block.
pub fn render_inject() -> &'static str {
    INJECT_JS
}

/// `STAGEHAND_DEVTOOLS=1` or `STAGEHAND_DEBUG=1`.
pub fn devtools_requested() -> bool {
    ["STAGEHAND_DEVTOOLS", "STAGEHAND_DEBUG"]
        .iter()
        .any(|k| std::env::var(k).is_ok_and(|v| v == "1"))
}
