use super::{colorize_status, json_pretty, runtime_line, Failure, EXIT_SUCCESS};
use stagehand_core::ProvisioningService;
use stagehand_schema::FamilyId;

fn status_name<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

pub fn run(service: &ProvisioningService, family: FamilyId, json: bool) -> Result<u8, Failure> {
    let report = service.state_report(family)?;
    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    let settings = &report.settings;
    println!("{}", report.label);
    println!("  default:        {}", settings.default_version.as_deref().unwrap_or("-"));
    if family == FamilyId::Nwjs {
        println!(
            "  greenworks:     {}",
            settings.greenworks_default_version.as_deref().unwrap_or("newest installed")
        );
        println!("  protections:    {}", if settings.enable_protections { "on" } else { "off" });
        println!("  case-insens.:   {}", if settings.case_insensitive { "on" } else { "off" });
        println!("  user scripts:   {}", if settings.enable_user_scripts { "on" } else { "off" });
    }

    println!("  installed:      {}", report.installed.len());
    for rt in &report.installed {
        println!("    {}", runtime_line(rt));
    }

    if let Some(ref state) = report.installing {
        let mut line = format!("{} {}", colorize_status(&status_name(&state.status)), state.version);
        if let Some(total) = state.total {
            line.push_str(&format!(" {}/{total} bytes", state.downloaded));
        }
        if let Some(ref err) = state.error {
            line.push_str(&format!(": {err}"));
        }
        println!("  install:        {line}");
    }

    let catalog = &report.catalog;
    println!("  catalog:        {}", colorize_status(&status_name(&catalog.state.status)));
    if let Some(ref latest) = catalog.latest_available_version {
        println!("  latest:         {latest}");
    }
    if catalog.update_available {
        println!("  update available");
    }
    Ok(EXIT_SUCCESS)
}
