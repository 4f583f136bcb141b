mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::Failure;
use stagehand_core::config::default_config_path;
use stagehand_core::{install_signal_handler, ProvisioningService, StagehandConfig};
use stagehand_schema::FamilyId;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Runtime provisioning and sandboxed launching for web-based guest content"
)]
struct Cli {
    /// Data directory (defaults to $STAGEHAND_DATA_DIR, then ~/.local/share/stagehand).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.config/stagehand/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Guest content and the wrapper options shared by `wrap` and `launch`.
#[derive(Debug, Args)]
pub struct WrapArgs {
    /// Directory holding the guest's files.
    pub content_root: PathBuf,
    /// Host module the guest belongs to (keys wrapper and profile storage).
    #[arg(long)]
    pub module: String,
    /// Stable guest identifier; derived from the content path when omitted.
    #[arg(long)]
    pub guest_id: Option<String>,
    /// Turn the sandbox guard off for this run.
    #[arg(long, default_value_t = false)]
    pub no_protections: bool,
    /// Resolve guest file paths case-insensitively.
    #[arg(long, default_value_t = false)]
    pub case_insensitive: bool,
    /// Extra script to run at document start (repeatable).
    #[arg(long = "inject")]
    pub inject: Vec<String>,
    /// Host-supplied cheats file handed to the in-guest inject script.
    #[arg(long)]
    pub cheats_file: Option<PathBuf>,
    /// Extra Chromium flag (repeatable).
    #[arg(long = "flag", allow_hyphen_values = true)]
    pub flags: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show installable versions of a runtime family.
    Catalog {
        /// nwjs, greenworks or mkxpz.
        family: FamilyId,
        /// Refetch even when the cached listing is fresh.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Download and install a runtime version.
    Install {
        family: FamilyId,
        version: String,
        #[arg(long)]
        variant: Option<String>,
    },
    /// List installed runtimes.
    List { family: FamilyId },
    /// Remove installed runtimes by version or by directory.
    Uninstall {
        family: FamilyId,
        #[arg(required_unless_present = "dir")]
        version: Option<String>,
        /// Only remove the build for this platform key (e.g. osx-x64).
        #[arg(long, requires = "version")]
        platform: Option<String>,
        #[arg(long, requires = "version")]
        variant: Option<String>,
        /// Remove the install at this path.
        #[arg(long, conflicts_with = "version")]
        dir: Option<PathBuf>,
    },
    /// Make a version the family default.
    SetDefault {
        family: FamilyId,
        version: String,
        #[arg(long)]
        variant: Option<String>,
    },
    /// Show settings, installs, catalog and any in-flight install.
    Status { family: FamilyId },
    /// Build the launch wrapper for a guest without starting it.
    Wrap {
        #[command(flatten)]
        wrap: WrapArgs,
    },
    /// Wrap a guest and start it under NW.js.
    Launch {
        #[command(flatten)]
        wrap: WrapArgs,
        /// NW.js version (defaults to the configured default).
        #[arg(long = "version")]
        runtime_version: Option<String>,
        #[arg(long)]
        variant: Option<String>,
        /// Install the runtime if it is missing.
        #[arg(long, default_value_t = false)]
        install: bool,
    },
    /// Remove wrappers, profiles and app bundles of a guest.
    Cleanup {
        content_root: PathBuf,
        #[arg(long)]
        module: String,
    },
    /// Run diagnostic checks on the host and data directory.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<StagehandConfig, Failure> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = StagehandConfig::load(&path)
        .map_err(|e| Failure::from(format!("failed to load config {}: {e}", path.display())))?;
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STAGEHAND_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

fn run(cli: Cli) -> Result<u8, Failure> {
    let json = cli.json;
    let config = load_config(&cli)?;
    let service = ProvisioningService::new(config);

    match cli.command {
        Commands::Catalog { family, force } => commands::catalog::run(&service, family, force, json),
        Commands::Install {
            family,
            version,
            variant,
        } => commands::install::run(&service, family, &version, variant.as_deref(), json),
        Commands::List { family } => commands::list::run(&service, family, json),
        Commands::Uninstall {
            family,
            version,
            platform,
            variant,
            dir,
        } => commands::uninstall::run(&service, family, version, platform, variant, dir, json),
        Commands::SetDefault {
            family,
            version,
            variant,
        } => commands::set_default::run(&service, family, &version, variant, json),
        Commands::Status { family } => commands::status::run(&service, family, json),
        Commands::Wrap { wrap } => commands::wrap::run(&service, &wrap, json),
        Commands::Launch {
            wrap,
            runtime_version,
            variant,
            install,
        } => commands::launch::run(&service, &wrap, runtime_version, variant, install, json),
        Commands::Cleanup {
            content_root,
            module,
        } => commands::cleanup::run(&service, &content_root, &module, json),
        Commands::Doctor => commands::doctor::run(&service, json).map_err(Failure::from),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    }
}
