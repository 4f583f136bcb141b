use super::{display_version, json_pretty, Failure, EXIT_SUCCESS};
use stagehand_core::ProvisioningService;
use stagehand_schema::FamilyId;

pub fn run(service: &ProvisioningService, family: FamilyId, json: bool) -> Result<u8, Failure> {
    let installed = service.list_installed(family);
    if json {
        println!("{}", json_pretty(&installed)?);
        return Ok(EXIT_SUCCESS);
    }
    if installed.is_empty() {
        println!("no {} runtimes installed", family.descriptor().label);
        return Ok(EXIT_SUCCESS);
    }

    let default = service.family_settings(family)?.default_version;
    println!("  {:<28} {:<10} {:<8} {:<15} PATH", "VERSION", "PLATFORM", "VARIANT", "SOURCE");
    for rt in &installed {
        let marker = if default.as_deref() == Some(rt.version.as_str()) { "*" } else { " " };
        let platform = rt.platform_key.as_ref().map_or("-", |k| k.as_str());
        println!(
            "{marker} {:<28} {:<10} {:<8} {:<15} {}",
            display_version(family, &rt.version),
            platform,
            rt.variant.as_deref().unwrap_or("-"),
            rt.source.to_string(),
            rt.install_dir.display()
        );
    }
    Ok(EXIT_SUCCESS)
}
