use super::{interrupted, json_pretty, render_progress, runtime_line, spin_fail, spin_ok, warn_line, Failure, EXIT_SUCCESS};
use stagehand_core::{shutdown_requested, ProvisioningService};
use stagehand_schema::FamilyId;
use std::sync::mpsc;

pub fn run(
    service: &ProvisioningService,
    family: FamilyId,
    version: &str,
    variant: Option<&str>,
    json: bool,
) -> Result<u8, Failure> {
    let label = family.descriptor().label;
    let (tx, rx) = mpsc::channel();
    let (result, pb) = std::thread::scope(|s| {
        let worker = s.spawn(move || service.install(family, version, variant, Some(tx)));
        let pb = (!json).then(|| render_progress(&rx, label));
        (worker.join(), pb)
    });
    let result = result.map_err(|_| format!("{label} install thread panicked"))?;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{label} {version}"));
            }
            return Err(e.into());
        }
    };
    if let Some(ref pb) = pb {
        spin_ok(pb, &format!("{label} {}", runtime_line(&outcome.runtime)));
    }

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        println!("installed at {}", outcome.runtime.install_dir.display());
        if outcome.used_fallback {
            eprintln!(
                "{}",
                warn_line(&format!(
                    "{version} could not be downloaded; installed bundled {} instead",
                    outcome.runtime.version
                ))
            );
        }
    }
    interrupted(shutdown_requested(), &format!("{label} {} install", outcome.runtime.version))?;
    Ok(EXIT_SUCCESS)
}
