use super::{json_pretty, Failure, EXIT_SUCCESS};
use stagehand_core::ProvisioningService;
use stagehand_schema::{FamilyId, SettingsAction};

pub fn run(
    service: &ProvisioningService,
    family: FamilyId,
    version: &str,
    variant: Option<String>,
    json: bool,
) -> Result<u8, Failure> {
    let action = SettingsAction::SetDefault {
        version: version.to_owned(),
        variant,
    };
    let settings = service.apply_settings_action(family, &action)?;
    if json {
        println!("{}", json_pretty(&settings)?);
    } else {
        println!(
            "default {} version: {}",
            family.descriptor().label,
            settings.default_version.as_deref().unwrap_or("-")
        );
        let installed = settings
            .default_version
            .as_deref()
            .is_some_and(|v| service.list_installed(family).iter().any(|r| r.version == v));
        if !installed {
            println!("(not installed yet; run `stagehand install {family} {version}`)");
        }
    }
    Ok(EXIT_SUCCESS)
}
