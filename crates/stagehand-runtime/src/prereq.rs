use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

pub(crate) fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .is_ok_and(|o| o.status.success())
}

fn translation_works() -> bool {
    Command::new("arch")
        .args(["-x86_64", "true"])
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Check what the host needs to start a runtime build.
///
/// Only translated launches (an x64 build on an arm64 host) need anything
/// beyond the runtime itself. Empty list means all prerequisites are met.
pub fn check_launch_prereqs(needs_translation: bool) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !needs_translation {
        return missing;
    }

    if !command_exists("arch") {
        missing.push(MissingPrereq {
            name: "arch",
            purpose: "starting x64 runtime builds on an arm64 host",
            install_hint: "part of the base system on macOS",
        });
    } else if !translation_works() {
        missing.push(MissingPrereq {
            name: "Rosetta 2",
            purpose: "running x64 runtime builds on Apple silicon",
            install_hint: "softwareupdate --install-rosetta --agree-to-license",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nStagehand needs these tools to start this runtime build.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "arch",
            purpose: "translated launches",
            install_hint: "base system",
        };
        let s = format!("{m}");
        assert!(s.contains("arch"));
        assert!(s.contains("translated launches"));
        assert!(s.contains("base system"));
    }

    #[test]
    fn native_launch_needs_nothing() {
        assert!(check_launch_prereqs(false).is_empty());
    }

    #[test]
    fn format_missing_lists_every_item() {
        let items = vec![
            MissingPrereq {
                name: "arch",
                purpose: "translation",
                install_hint: "macOS",
            },
            MissingPrereq {
                name: "Rosetta 2",
                purpose: "x64 builds",
                install_hint: "softwareupdate",
            },
        ];
        let output = format_missing(&items);
        assert!(output.starts_with("missing prerequisites:"));
        assert!(output.contains("arch"));
        assert!(output.contains("Rosetta 2"));
    }
}
