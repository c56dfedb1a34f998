//! fcflash CLI - Command-line tool for flashing flight-controller firmware.
//!
//! ## Features
//!
//! - Flash `.apj` firmware packages over a serial bootloader
//! - Inspect firmware containers
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use commands::completions::{cmd_completions, detect_shell_type};
use commands::flash::cmd_flash;
use commands::info::cmd_info;
use config::Config;

/// fcflash - A cross-platform tool for flashing flight-controller firmware.
///
/// Environment variables:
///   FCFLASH_PORT   - Default serial port
///   FCFLASH_BAUD   - Default baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "fcflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyACM0 or COM3).
    #[arg(short, long, global = true, env = "FCFLASH_PORT")]
    port: Option<String>,

    /// Baud rate for the bootloader connection (default: 115200).
    #[arg(short, long, global = true, env = "FCFLASH_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash an .apj firmware package.
    Flash {
        /// Path to the .apj firmware file.
        firmware: PathBuf,

        /// Overall bootloader connection timeout in seconds.
        #[arg(long, default_value = "30", value_name = "SECONDS")]
        connect_timeout: u64,

        /// Full-chip erase timeout in seconds.
        #[arg(long, default_value = "60", value_name = "SECONDS")]
        erase_timeout: u64,
    },

    /// Show information about a firmware file.
    Info {
        /// Path to the .apj firmware file.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// Process-level errors carrying a conventional exit code.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Invalid usage or missing setup; exits with code 2.
    #[error("{0}")]
    Usage(String),
    /// Interrupted by the user; exits with code 130.
    #[error("Cancelled")]
    Cancelled,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled => 130,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        let code = err
            .downcast_ref::<CliError>()
            .map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection (clig.dev best practice) ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
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

    debug!(
        "fcflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            connect_timeout,
            erase_timeout,
        } => {
            cmd_flash(&cli, &config, firmware, *connect_timeout, *erase_timeout)?;
        },
        Commands::Info { firmware, json } => {
            cmd_info(firmware, *json)?;
        },
        Commands::Completions { shell } => {
            let shell = shell.or_else(detect_shell_type).ok_or_else(|| {
                CliError::Usage(
                    "Could not detect your shell; specify one, e.g.: fcflash completions bash"
                        .to_string(),
                )
            })?;
            cmd_completions(shell);
        },
    }

    Ok(())
}

/// Resolve the serial port from CLI args or configuration.
fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    if let Some(port) = &cli.port {
        return Ok(port.clone());
    }
    if let Some(port) = &config.connection.serial {
        debug!("Using port from configuration: {port}");
        return Ok(port.clone());
    }
    Err(CliError::Usage(
        "No serial port specified. Use --port, FCFLASH_PORT, or set [connection] serial in the config file".to_string(),
    )
    .into())
}

/// Baud rate used when neither the command line nor the config sets one.
const DEFAULT_BAUD: u32 = 115200;

/// Resolve the baud rate: an explicit CLI value (flag or FCFLASH_BAUD) wins
/// over configuration, and the default only applies when both are silent.
fn get_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    fn config_with_baud(baud: u32) -> Config {
        let mut config = Config::default();
        config.connection.baud = Some(baud);
        config
    }

    #[test]
    fn test_baud_defaults_when_unset() {
        let cli = parse(&["fcflash", "info", "fw.apj"]);
        assert_eq!(get_baud(&cli, &Config::default()), DEFAULT_BAUD);
    }

    #[test]
    fn test_baud_from_config_when_flag_absent() {
        let cli = parse(&["fcflash", "info", "fw.apj"]);
        assert_eq!(get_baud(&cli, &config_with_baud(57600)), 57600);
    }

    #[test]
    fn test_explicit_baud_beats_config() {
        let cli = parse(&["fcflash", "--baud", "921600", "info", "fw.apj"]);
        assert_eq!(get_baud(&cli, &config_with_baud(57600)), 921600);
    }

    #[test]
    fn test_explicit_default_baud_beats_config() {
        // Passing the default rate explicitly is still an explicit choice.
        let cli = parse(&["fcflash", "--baud", "115200", "info", "fw.apj"]);
        assert_eq!(get_baud(&cli, &config_with_baud(57600)), 115200);
    }
}
