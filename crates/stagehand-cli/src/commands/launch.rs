use super::{guest_request, interrupted, json_pretty, render_progress, spin_fail, spin_ok, Failure, EXIT_SUCCESS};
use crate::WrapArgs;
use stagehand_core::{shutdown_requested, ProvisioningService};
use std::sync::mpsc;

pub fn run(
    service: &ProvisioningService,
    args: &WrapArgs,
    version: Option<String>,
    variant: Option<String>,
    allow_install: bool,
    json: bool,
) -> Result<u8, Failure> {
    interrupted(shutdown_requested(), "startup")?;
    let mut request = guest_request(args)?;
    request.version = version;
    request.variant = variant;
    request.allow_install = allow_install;

    let (tx, rx) = mpsc::channel();
    let request = &request;
    let (result, pb) = std::thread::scope(|s| {
        let worker = s.spawn(move || service.prepare_launch(request, Some(tx)));
        let pb = (!json).then(|| render_progress(&rx, "NW.js"));
        (worker.join(), pb)
    });
    let result = result.map_err(|_| "launch thread panicked".to_owned())?;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("launch {}", args.content_root.display()));
            }
            return Err(e.into());
        }
    };
    if let Some(ref pb) = pb {
        spin_ok(pb, &format!("NW.js {}", report.runtime.signature()));
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!("started {} (pid {})", args.content_root.display(), report.process.pid);
        println!("  runtime: {}", report.runtime.install_dir.display());
        println!("  wrapper: {}", report.wrapped.wrapper.path.display());
        println!("  profile: {}", report.process.profile_dir.display());
    }
    Ok(EXIT_SUCCESS)
}
