use super::{json_pretty, Failure, EXIT_SUCCESS};
use stagehand_core::{ProvisioningService, UninstallTarget};
use stagehand_schema::{FamilyId, PlatformKey};
use std::path::PathBuf;

#[allow(clippy::needless_pass_by_value)]
pub fn run(
    service: &ProvisioningService,
    family: FamilyId,
    version: Option<String>,
    platform: Option<String>,
    variant: Option<String>,
    dir: Option<PathBuf>,
    json: bool,
) -> Result<u8, Failure> {
    let target = match (dir, version) {
        (Some(dir), _) => UninstallTarget::Dir(dir),
        (None, Some(version)) => UninstallTarget::Version {
            version,
            platform_key: platform.as_deref().map(PlatformKey::new),
            variant,
        },
        (None, None) => return Err("a version or --dir is required".to_owned().into()),
    };
    let removed = service.uninstall(family, &target)?;
    let default = service.family_settings(family)?.default_version;

    if json {
        let payload = serde_json::json!({
            "removed": removed,
            "defaultVersion": default,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for dir in &removed {
            println!("removed {}", dir.display());
        }
        match default {
            Some(v) => println!("default {} version: {v}", family.descriptor().label),
            None => println!("no {} runtimes left; default cleared", family.descriptor().label),
        }
    }
    Ok(EXIT_SUCCESS)
}
