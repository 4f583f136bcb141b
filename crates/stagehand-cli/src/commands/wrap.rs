use super::{guest_request, json_pretty, Failure, EXIT_SUCCESS};
use crate::WrapArgs;
use stagehand_core::ProvisioningService;

pub fn run(service: &ProvisioningService, args: &WrapArgs, json: bool) -> Result<u8, Failure> {
    let request = guest_request(args)?;
    let wrapped = service.wrap(&request)?;
    if json {
        println!("{}", json_pretty(&wrapped)?);
        return Ok(EXIT_SUCCESS);
    }

    let w = &wrapped.wrapper;
    println!("wrapper: {}", w.path.display());
    if w.minted {
        println!("  (new directory: another guest already uses id {})", w.id);
    }
    println!(
        "  overlay: {} linked, {} copied, {} kept",
        w.overlay.linked, w.overlay.copied, w.overlay.skipped
    );
    if let Some(ref sdk) = wrapped.greenworks {
        println!(
            "  Greenworks {} overlaid at {} location(s)",
            sdk.version,
            wrapped.sdk_targets.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
