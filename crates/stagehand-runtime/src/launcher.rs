//! Detached runtime process spawning.

use crate::prereq::{check_launch_prereqs, format_missing};
use crate::RuntimeError;
use serde::Serialize;
use stagehand_schema::{HostArch, InstalledRuntime};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
    pub runtime: &'a InstalledRuntime,
    /// Directory handed to the runtime as its app root.
    pub app_dir: &'a Path,
    pub profile_dir: &'a Path,
    pub host: HostArch,
    pub env: Vec<(String, String)>,
}

/// What was started; the child is not waited on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchedProcess {
    pub pid: u32,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub profile_dir: PathBuf,
}

fn translated(req: &LaunchRequest<'_>) -> bool {
    req.runtime
        .platform_key
        .as_ref()
        .is_some_and(|key| req.host.needs_translation(key))
}

/// Build the program and argument list without spawning.
pub fn command_line(req: &LaunchRequest<'_>) -> Result<(PathBuf, Vec<String>), RuntimeError> {
    let executable = req
        .runtime
        .executable_path
        .clone()
        .ok_or_else(|| RuntimeError::ExecutableMissing(req.runtime.install_dir.clone()))?;
    let mut args = vec![
        format!("--user-data-dir={}", req.profile_dir.display()),
        req.app_dir.display().to_string(),
    ];
    if translated(req) {
        args.insert(0, executable.display().to_string());
        args.insert(0, "-x86_64".to_owned());
        return Ok((PathBuf::from("arch"), args));
    }
    Ok((executable, args))
}

/// Start the runtime detached from the calling process.
///
/// Output is discarded and the child gets its own process group, so closing
/// the launcher does not take the guest down with it.
pub fn launch(req: &LaunchRequest<'_>) -> Result<LaunchedProcess, RuntimeError> {
    if let Some(exe) = req.runtime.executable_path.as_deref() {
        if !exe.is_file() {
            return Err(RuntimeError::ExecutableMissing(exe.to_path_buf()));
        }
    }
    let (program, args) = command_line(req)?;
    if translated(req) && std::env::var("STAGEHAND_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_launch_prereqs(true);
        if !missing.is_empty() {
            return Err(RuntimeError::PrereqMissing(format_missing(&missing)));
        }
    }
    fs::create_dir_all(req.profile_dir)?;

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .current_dir(req.app_dir)
        .envs(req.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    debug!("spawning {} {:?}", program.display(), args);
    let child = cmd.spawn().map_err(|source| RuntimeError::SpawnFailed {
        executable: program.clone(),
        source,
    })?;
    info!(
        "started {} v{} (pid {})",
        program.display(),
        req.runtime.version,
        child.id()
    );

    Ok(LaunchedProcess {
        pid: child.id(),
        command: program,
        args,
        profile_dir: req.profile_dir.to_path_buf(),
    })
}
