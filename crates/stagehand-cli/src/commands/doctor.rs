use super::{EXIT_FAILURE, EXIT_SUCCESS};
use stagehand_core::{ProvisioningService, StoreLock};
use stagehand_schema::{FamilyId, HostArch};

pub fn run(service: &ProvisioningService, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_host(service.host(), &mut checks);

    let layout = service.layout();
    if layout.root().exists() {
        checks.push(Check::pass(
            "data_dir",
            &format!("Data directory {}", layout.root().display()),
        ));
        check_store(service, &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "data_dir",
            "Data directory not initialized (will be created on first install)",
        ));
    }

    print_results(&checks, all_pass, json_output)
}

fn check_host(host: HostArch, checks: &mut Vec<Check>) {
    checks.push(Check::info(
        "host_arch",
        &format!("Host architecture: {}", host_name(host)),
    ));
    if host != HostArch::Arm64 {
        return;
    }
    let missing = stagehand_runtime::check_launch_prereqs(true);
    if missing.is_empty() {
        checks.push(Check::pass(
            "translation",
            "x64 runtime builds can run under translation",
        ));
    } else {
        // Native arm64 builds still work; only the fallback is affected.
        checks.push(Check::warn(
            "translation",
            &stagehand_runtime::format_missing(&missing),
        ));
    }
}

fn host_name(host: HostArch) -> &'static str {
    match host {
        HostArch::Arm64 => "arm64",
        HostArch::X64 => "x64",
    }
}

fn check_store(service: &ProvisioningService, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = service.layout();

    match service.settings() {
        Ok(_) => checks.push(Check::pass("settings", "Runtime settings readable")),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("settings", &format!("Cannot read settings: {e}")));
        }
    }

    match std::fs::read_dir(layout.staging_dir()) {
        Ok(entries) => {
            let leftovers = entries.filter_map(Result::ok).count();
            if leftovers == 0 {
                checks.push(Check::pass("staging", "Staging area is clean"));
            } else {
                checks.push(Check::warn(
                    "staging",
                    &format!("{leftovers} leftover staging entries from interrupted installs"),
                ));
            }
        }
        Err(_) => checks.push(Check::pass("staging", "Staging area is clean")),
    }

    for family in FamilyId::ALL {
        let label = family.descriptor().label;
        let name = format!("lock_{family}");
        match StoreLock::try_acquire(&layout.family_lock(family)) {
            Ok(Some(_)) => {}
            Ok(None) => checks.push(Check::warn(
                &name,
                &format!("{label} store is locked by another process"),
            )),
            Err(e) => {
                *all_pass = false;
                checks.push(Check::fail(&name, &format!("Cannot check {label} lock: {e}")));
            }
        }

        let installed = service.list_installed(family);
        let default = service
            .family_settings(family)
            .ok()
            .and_then(|s| s.default_version)
            .unwrap_or_else(|| "-".to_owned());
        checks.push(Check::info(
            &format!("installed_{family}"),
            &format!("{label}: {} installed (default {default})", installed.len()),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Stagehand Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
