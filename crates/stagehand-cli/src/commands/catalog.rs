use super::{colorize_status, display_version, json_pretty, spin_fail, spin_ok, spinner, Failure, EXIT_SUCCESS};
use stagehand_core::ProvisioningService;
use stagehand_schema::FamilyId;

pub fn run(service: &ProvisioningService, family: FamilyId, force: bool, json: bool) -> Result<u8, Failure> {
    let label = family.descriptor().label;
    let pb = (!json).then(|| spinner(&format!("fetching {label} versions")));
    let refreshed = service.refresh_catalog(family, force);
    if let Some(ref pb) = pb {
        match refreshed {
            Ok(ref state) => spin_ok(pb, &format!("{} {label} versions", state.versions.len())),
            Err(ref e) => spin_fail(pb, &format!("{label} catalog: {e}")),
        }
    }
    refreshed?;

    let report = service.state_report(family)?;
    if json {
        println!("{}", json_pretty(&report.catalog)?);
        return Ok(EXIT_SUCCESS);
    }

    let catalog = &report.catalog;
    println!(
        "{label}: {} (source: {})",
        colorize_status("success"),
        catalog.state.source.as_deref().unwrap_or("-")
    );
    let default = report.settings.default_version.as_deref();
    for version in &catalog.state.versions {
        let installed = report.installed.iter().any(|r| &r.version == version);
        let marker = if Some(version.as_str()) == default { "*" } else { " " };
        let shown = display_version(family, version);
        let note = if installed { "installed" } else { "" };
        if shown == *version {
            println!("{marker} {version:<28} {note}");
        } else {
            println!("{marker} {shown:<10} {version:<28} {note}");
        }
    }
    if catalog.update_available {
        if let Some(ref latest) = catalog.latest_available_version {
            println!("\nupdate available: {latest}");
        }
    }
    Ok(EXIT_SUCCESS)
}
