//! The wrapper's `package.json`: the guest's own manifest plus a `stagehand`
//! block the injected scripts read at startup.

use crate::flags::{dedupe, inject_list, merge_flags};
use serde_json::{json, Map, Value};
use std::path::Path;

pub const START_SCRIPT: &str = "stagehand-start.js";
pub const END_SCRIPT: &str = "stagehand-end.js";
pub const BG_SCRIPT: &str = "bg.js";
pub const PATCHED_CONFIG_PATH: &str = "__stagehand/nwjs-patched/patch.json";

#[derive(Debug, Clone)]
pub struct ManifestInputs<'a> {
    pub wrapper_id: &'a str,
    pub game_path: &'a Path,
    pub module_id: &'a str,
    /// Entry HTML relative to the content root, `/`-separated.
    pub relative_main: String,
    pub protections: bool,
    pub case_insensitive: bool,
    pub inject_start: &'a [String],
    pub chromium_args: &'a [String],
    pub cheats_file_path: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenManifest {
    pub manifest: Map<String, Value>,
    pub inject_start: Vec<String>,
    pub inject_end: Vec<String>,
    pub needs_bg: bool,
}

pub fn rewrite_manifest(original: Option<Map<String, Value>>, inputs: &ManifestInputs<'_>) -> RewrittenManifest {
    let mut m = original.unwrap_or_default();

    m.insert("main".to_owned(), Value::String(inputs.relative_main.clone()));
    let has_name = m
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !has_name {
        m.insert("name".to_owned(), json!(format!("stagehand-{}", inputs.wrapper_id)));
    }

    let inject_start = dedupe(
        inputs
            .inject_start
            .iter()
            .map(|s| s.trim().to_owned())
            .chain(inject_list(m.get("inject_js_start"))),
    );
    let inject_end = inject_list(m.get("inject_js_end"));

    let mut block = match m.remove("stagehand") {
        Some(Value::Object(existing)) => existing,
        _ => Map::new(),
    };
    block.insert("gamePath".to_owned(), json!(inputs.game_path.to_string_lossy()));
    block.insert("moduleId".to_owned(), json!(inputs.module_id));
    block.insert("patchedConfigPath".to_owned(), json!(PATCHED_CONFIG_PATH));
    block.insert("caseInsensitive".to_owned(), json!(inputs.case_insensitive));
    block.insert("offlineEnabled".to_owned(), json!(inputs.protections));
    block.insert("injectStart".to_owned(), json!(inject_start));
    if inject_end.is_empty() {
        block.remove("injectEnd");
    } else {
        block.insert("injectEnd".to_owned(), json!(inject_end));
    }
    match inputs.cheats_file_path {
        Some(cheats) => block.insert("cheatsFilePath".to_owned(), json!(cheats.to_string_lossy())),
        None => block.remove("cheatsFilePath"),
    };
    m.insert("stagehand".to_owned(), Value::Object(block));

    m.insert("inject_js_start".to_owned(), json!(START_SCRIPT));
    if inject_end.is_empty() {
        m.remove("inject_js_end");
    } else {
        m.insert("inject_js_end".to_owned(), json!(END_SCRIPT));
    }

    let needs_bg = inputs.protections || inputs.case_insensitive;
    if needs_bg {
        m.insert("bg-script".to_owned(), json!(BG_SCRIPT));
    } else {
        m.remove("bg-script");
    }

    let existing_flags = m.get("chromium-args").and_then(Value::as_str).map(str::to_owned);
    match merge_flags(existing_flags.as_deref(), inputs.protections, inputs.chromium_args) {
        Some(flags) => {
            m.insert("chromium-args".to_owned(), Value::String(flags));
        }
        None => {
            m.remove("chromium-args");
        }
    }

    RewrittenManifest {
        manifest: m,
        inject_start,
        inject_end,
        needs_bg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(inject: &'a [String], flags: &'a [String]) -> ManifestInputs<'a> {
        ManifestInputs {
            wrapper_id: "abc123",
            game_path: Path::new("/games/g"),
            module_id: "mz",
            relative_main: "www/index.html".to_owned(),
            protections: true,
            case_insensitive: false,
            inject_start: inject,
            chromium_args: flags,
            cheats_file_path: None,
        }
    }

    fn obj(v: Value) -> Option<Map<String, Value>> {
        v.as_object().cloned()
    }

    #[test]
    fn fills_main_name_and_block() {
        let out = rewrite_manifest(None, &inputs(&[], &[]));
        let m = &out.manifest;
        assert_eq!(m["main"], "www/index.html");
        assert_eq!(m["name"], "stagehand-abc123");
        assert_eq!(m["stagehand"]["moduleId"], "mz");
        assert_eq!(m["stagehand"]["offlineEnabled"], true);
        assert_eq!(m["stagehand"]["patchedConfigPath"], PATCHED_CONFIG_PATH);
        assert_eq!(m["inject_js_start"], START_SCRIPT);
        assert_eq!(m["bg-script"], BG_SCRIPT);
        assert!(m.get("inject_js_end").is_none());
    }

    #[test]
    fn requested_inject_comes_first_then_existing() {
        let original = obj(json!({"name": "game", "inject_js_start": ["old.js", "shared.js"]}));
        let requested = vec!["shared.js".to_owned(), "new.js".to_owned()];
        let out = rewrite_manifest(original, &inputs(&requested, &[]));
        assert_eq!(out.inject_start, vec!["shared.js", "new.js", "old.js"]);
        assert_eq!(out.manifest["name"], "game");
    }

    #[test]
    fn inject_end_moves_into_block() {
        let original = obj(json!({"inject_js_end": "tail.js"}));
        let out = rewrite_manifest(original, &inputs(&[], &[]));
        assert_eq!(out.inject_end, vec!["tail.js"]);
        assert_eq!(out.manifest["inject_js_end"], END_SCRIPT);
        assert_eq!(out.manifest["stagehand"]["injectEnd"], json!(["tail.js"]));
    }

    #[test]
    fn no_protections_drops_bg_and_flags() {
        let original = obj(json!({"bg-script": "old.js", "chromium-args": "--disable-devtools"}));
        let mut i = inputs(&[], &[]);
        i.protections = false;
        let out = rewrite_manifest(original, &i);
        assert!(!out.needs_bg);
        assert!(out.manifest.get("bg-script").is_none());
        assert!(out.manifest.get("chromium-args").is_none());
    }

    #[test]
    fn case_insensitive_alone_needs_bg() {
        let mut i = inputs(&[], &[]);
        i.protections = false;
        i.case_insensitive = true;
        let out = rewrite_manifest(None, &i);
        assert!(out.needs_bg);
        assert_eq!(out.manifest["stagehand"]["caseInsensitive"], true);
    }

    #[test]
    fn existing_block_fields_survive() {
        let original = obj(json!({"stagehand": {"custom": 1, "injectEnd": ["stale.js"]}}));
        let out = rewrite_manifest(original, &inputs(&[], &[]));
        assert_eq!(out.manifest["stagehand"]["custom"], 1);
        assert!(out.manifest["stagehand"].get("injectEnd").is_none());
    }

    #[test]
    fn caller_flags_follow_protection_flags() {
        let flags = vec!["--enable-gpu".to_owned()];
        let out = rewrite_manifest(obj(json!({"chromium-args": "--foo"})), &inputs(&[], &flags));
        let merged = out.manifest["chromium-args"].as_str().unwrap();
        assert!(merged.starts_with("--foo --disable-background-networking"));
        assert!(merged.ends_with("--enable-gpu"));
    }
}
