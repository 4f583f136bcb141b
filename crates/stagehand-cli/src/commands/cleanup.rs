use super::{json_pretty, Failure, EXIT_SUCCESS};
use stagehand_core::ProvisioningService;
use std::path::Path;

pub fn run(service: &ProvisioningService, content_root: &Path, module: &str, json: bool) -> Result<u8, Failure> {
    // Identity is keyed by the canonical path the guest was wrapped with.
    let game_path = content_root.canonicalize().unwrap_or_else(|_| content_root.to_path_buf());
    let report = service.cleanup_guest_data(module, &game_path)?;
    if json {
        println!("{}", json_pretty(&report)?);
    } else if report.removed.is_empty() {
        println!("nothing to clean for {}", game_path.display());
    } else {
        for path in &report.removed {
            println!("removed {}", path.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
