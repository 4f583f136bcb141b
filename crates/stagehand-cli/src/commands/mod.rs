pub mod catalog;
pub mod cleanup;
pub mod completions;
pub mod doctor;
pub mod install;
pub mod launch;
pub mod list;
pub mod man_pages;
pub mod set_default;
pub mod status;
pub mod uninstall;
pub mod wrap;

use crate::WrapArgs;
use indicatif::{ProgressBar, ProgressStyle};
use stagehand_core::{CoreError, GuestLaunch, ProgressEvent};
use stagehand_runtime::{ContentDetector, WebContentDetector};
use stagehand_schema::{version_label, FamilyId, InstalledRuntime};
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;
pub const EXIT_NOT_INSTALLED: u8 = 3;
/// Shell convention for SIGINT.
pub const EXIT_INTERRUPTED: u8 = 130;

/// A failed command: what to print and which exit code to use.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self {
            code: EXIT_FAILURE,
            message,
        }
    }
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        let code = if e.is_interrupted() {
            EXIT_INTERRUPTED
        } else if e.is_usage() {
            EXIT_USAGE_ERROR
        } else if e.is_not_installed() {
            EXIT_NOT_INSTALLED
        } else {
            EXIT_FAILURE
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

/// Ctrl-C arrived while a command was running: the work in hand was finished
/// but nothing further should start.
pub fn interrupted(requested: bool, finished: &str) -> Result<(), Failure> {
    if requested {
        return Err(Failure {
            code: EXIT_INTERRUPTED,
            message: format!("interrupted after {finished}"),
        });
    }
    Ok(())
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .expect("valid template")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .expect("valid template")
        .progress_chars("=> ")
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Drive a progress bar from install events until the sender goes away.
pub fn render_progress(rx: &Receiver<ProgressEvent>, label: &str) -> ProgressBar {
    let pb = spinner(&format!("resolving {label}"));
    let mut sized = false;
    for event in rx {
        match event {
            ProgressEvent::Resolving { version } => pb.set_message(format!("resolving {label} {version}")),
            ProgressEvent::Downloading { downloaded, total } => {
                if let (Some(total), false) = (total, sized) {
                    pb.set_style(download_style());
                    pb.set_length(total);
                    sized = true;
                }
                pb.set_message(format!("downloading {label}"));
                pb.set_position(downloaded);
            }
            ProgressEvent::Extracting => {
                pb.set_style(spinner_style());
                pb.set_message(format!("extracting {label}"));
            }
            ProgressEvent::Installed { .. } => break,
        }
    }
    pb
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "success" => Style::new().green().apply_to(status).to_string(),
        "loading" | "downloading" | "extracting" => Style::new().cyan().apply_to(status).to_string(),
        "error" => Style::new().red().bold().apply_to(status).to_string(),
        "idle" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

pub fn warn_line(msg: &str) -> String {
    console::Style::new().yellow().apply_to(format!("warning: {msg}")).to_string()
}

/// `0.80.0` for semver families; the short date for build tokens.
pub fn display_version(family: FamilyId, version: &str) -> String {
    version_label(family.descriptor().grammar, version)
}

pub fn runtime_line(rt: &InstalledRuntime) -> String {
    let mut line = rt.version.clone();
    if let Some(ref key) = rt.platform_key {
        line.push_str(&format!(" ({key}"));
        if let Some(ref variant) = rt.variant {
            line.push_str(&format!(", {variant}"));
        }
        line.push(')');
    }
    line
}

/// Detect the guest entry under `args.content_root` and fold the flags into a launch request.
pub fn guest_request(args: &WrapArgs) -> Result<GuestLaunch, Failure> {
    let root = args
        .content_root
        .canonicalize()
        .map_err(|e| format!("cannot read {}: {e}", args.content_root.display()))?;
    let mut entry = WebContentDetector
        .detect(&root)
        .ok_or_else(|| format!("no HTML entry point found in {}", root.display()))?;
    entry.guest_id.clone_from(&args.guest_id);

    let mut request = GuestLaunch::new(&args.module, entry);
    request.inject_start.clone_from(&args.inject);
    request.chromium_args.clone_from(&args.flags);
    request.cheats_file_path.clone_from(&args.cheats_file);
    if args.no_protections {
        request.protections = Some(false);
    }
    if args.case_insensitive {
        request.case_insensitive = Some(true);
    }
    Ok(request)
}
