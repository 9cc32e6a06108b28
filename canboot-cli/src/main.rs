//! canboot CLI - Command-line firmware uploader for CAN bus bootloaders.
//!
//! ## Features
//!
//! - Interactive bootloader shell with history and tab completion
//! - One-shot erase, write, CRC and info commands for scripts
//! - Progress bar during uploads
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use canboot::{TargetId, Transport, Uploader};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::{debug, warn};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod shell;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler, polled by long-running operations.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress bars and colors should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed since the flag was last cleared.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the Ctrl-C flag so the shell can keep running after a cancelled upload.
pub(crate) fn clear_interrupted_flag() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Failures with a defined process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad arguments or configuration (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user cancelled the operation (exit code 130).
    #[error("{0}")]
    Cancelled(String),
    /// The operation ran and failed (exit code 1).
    #[error("{0}")]
    Failed(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
            Self::Failed(_) => 1,
        }
    }
}

/// canboot - Upload firmware to bootloaders on a CAN bus.
///
/// Environment variables:
///   CANBOOT_INTERFACE         - CAN interface (default: can0)
///   CANBOOT_TARGET            - Bootloader node ID (default: 0x01)
///   CANBOOT_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "canboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// CAN interface to use.
    #[arg(short, long, global = true, env = "CANBOOT_INTERFACE")]
    interface: Option<String>,

    /// Bootloader node ID, hex (0x01) or decimal (1), range 0x00-0x1F.
    #[arg(short, long, global = true, env = "CANBOOT_TARGET")]
    target: Option<TargetId>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Upload without asking for confirmation.
    #[arg(short, long, global = true)]
    yes: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "CANBOOT_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the interactive bootloader shell (default).
    Shell,

    /// Erase the application flash.
    Erase,

    /// Upload a raw firmware binary and verify its CRC.
    Write {
        /// Path to the firmware binary.
        file: PathBuf,
    },

    /// Read the application CRC from the device.
    Crc {
        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show device information.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// Effective settings after merging flags, environment and config files.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub interface: String,
    pub target: TargetId,
    pub frame_logging: bool,
    pub quiet: bool,
    pub assume_yes: bool,
    pub non_interactive: bool,
    pub history_path: Option<PathBuf>,
    pub history_size: usize,
}

impl Settings {
    fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let target = match (cli.target, config.device.target.as_deref()) {
            (Some(target), _) => target,
            (None, Some(raw)) => raw.parse().map_err(|e| {
                CliError::Usage(format!("Invalid [device] target in configuration: {e}"))
            })?,
            (None, None) => TargetId::DEFAULT,
        };

        Ok(Self {
            interface: cli
                .interface
                .clone()
                .unwrap_or_else(|| config.interface().to_string()),
            target,
            frame_logging: !cli.quiet && config.shell.verbose.unwrap_or(true),
            quiet: cli.quiet,
            assume_yes: cli.yes,
            non_interactive: cli.non_interactive,
            history_path: config.history_path(),
            history_size: config.history_size(),
        })
    }
}

/// Bus handle used by every command.
pub(crate) type Bus = Box<dyn Transport>;

#[cfg(target_os = "linux")]
fn open_bus(interface: &str) -> Result<Bus> {
    let transport = canboot::SocketCanTransport::open(interface)
        .with_context(|| format!("Failed to open CAN interface {interface}"))?;
    Ok(Box::new(transport))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(interface: &str) -> Result<Bus> {
    Err(CliError::Failed(format!(
        "Cannot open {interface}: SocketCAN is only available on Linux"
    ))
    .into())
}

/// Open the configured interface and address the configured target.
pub(crate) fn open_uploader(settings: &Settings) -> Result<Uploader<Bus>> {
    let bus = open_bus(&settings.interface)?;
    let uploader = Uploader::new(bus)
        .with_context(|| format!("Failed to start receiving on {}", settings.interface))?;

    uploader
        .state()
        .set_target(settings.target);
    if !settings.target.fits_standard_id() {
        warn!(
            "Node ID {} needs extended CAN identifiers; {} will reject its frames",
            settings.target, settings.interface
        );
    }
    uploader.set_verbose(settings.frame_logging);
    debug!(
        "Using interface {} with node ID {}",
        settings.interface, settings.target
    );
    Ok(uploader)
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        debug!("Failed to install Ctrl-C handler: {e}");
    }
    canboot::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(Commands::Completions { shell }) = &cli.command {
        return commands::completions::cmd_completions(*shell);
    }

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let settings = Settings::resolve(cli, &config)?;

    match &cli.command {
        None | Some(Commands::Shell) => shell::run(&settings),
        Some(Commands::Erase) => commands::upload::cmd_erase(&settings),
        Some(Commands::Write { file }) => commands::upload::cmd_write(&settings, file),
        Some(Commands::Crc { json }) => commands::upload::cmd_crc(&settings, *json),
        Some(Commands::Info { json }) => commands::info::cmd_info(&settings, *json),
        Some(Commands::Completions { .. }) => Ok(()),
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "canboot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_is_shell() {
        let cli = Cli::try_parse_from(["canboot"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_cli_parse_write() {
        let cli = Cli::try_parse_from(["canboot", "write", "app.bin"]).unwrap();
        match cli.command {
            Some(Commands::Write { file }) => assert_eq!(file, PathBuf::from("app.bin")),
            _ => panic!("Expected Write command"),
        }
    }

    #[test]
    fn test_cli_parse_info_json() {
        let cli = Cli::try_parse_from(["canboot", "info", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Info { json: true })));
    }

    #[test]
    fn test_cli_parse_crc() {
        let cli = Cli::try_parse_from(["canboot", "crc"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Crc { json: false })));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "canboot", "erase", "-i", "vcan0", "-t", "0x1F", "-vv", "--yes",
        ])
        .unwrap();
        assert_eq!(cli.interface.as_deref(), Some("vcan0"));
        assert_eq!(cli.target.map(TargetId::get), Some(0x1F));
        assert_eq!(cli.verbose, 2);
        assert!(cli.yes);
    }

    #[test]
    fn test_cli_decimal_target() {
        let cli = Cli::try_parse_from(["canboot", "-t", "12", "crc"]).unwrap();
        assert_eq!(cli.target.map(TargetId::get), Some(12));
    }

    #[test]
    fn test_cli_invalid_target() {
        assert!(Cli::try_parse_from(["canboot", "-t", "0x20", "erase"]).is_err());
        assert!(Cli::try_parse_from(["canboot", "-t", "abc", "erase"]).is_err());
    }

    #[test]
    fn test_settings_cli_overrides_config() {
        let cli = Cli::try_parse_from(["canboot", "-i", "can3", "-t", "5", "erase"]).unwrap();
        let mut config = Config::default();
        config.bus.interface = Some("can1".to_string());
        config.device.target = Some("0x02".to_string());

        let settings = Settings::resolve(&cli, &config).unwrap();
        assert_eq!(settings.interface, "can3");
        assert_eq!(settings.target.get(), 5);
    }

    #[test]
    fn test_settings_from_config() {
        let cli = Cli::try_parse_from(["canboot", "erase"]).unwrap();
        let mut config = Config::default();
        config.bus.interface = Some("vcan0".to_string());
        config.device.target = Some("0x02".to_string());
        config.shell.verbose = Some(false);

        let settings = Settings::resolve(&cli, &config).unwrap();
        assert_eq!(settings.interface, "vcan0");
        assert_eq!(settings.target.get(), 2);
        assert!(!settings.frame_logging);
    }

    #[test]
    fn test_settings_invalid_config_target_is_usage_error() {
        let cli = Cli::try_parse_from(["canboot", "erase"]).unwrap();
        let mut config = Config::default();
        config.device.target = Some("0x40".to_string());

        let err = Settings::resolve(&cli, &config).unwrap_err();
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn test_settings_quiet_disables_frame_logging() {
        let cli = Cli::try_parse_from(["canboot", "-q", "erase"]).unwrap();
        let settings = Settings::resolve(&cli, &Config::default()).unwrap();
        assert!(!settings.frame_logging);
        assert_eq!(settings.interface, "can0");
        assert_eq!(settings.target, TargetId::DEFAULT);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::Usage(String::new()).into()), 2);
        assert_eq!(exit_code_for(&CliError::Cancelled(String::new()).into()), 130);
        assert_eq!(exit_code_for(&CliError::Failed(String::new()).into()), 1);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }
}
