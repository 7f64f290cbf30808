//! CLI Entry Point for GPIB instruments
//!
//! Provides command-line access to:
//! - Querying the identification string of a SCPI instrument (`*IDN?`)
//! - Scanning a board for listening devices
//! - Showing the state of the bus control lines
//!
//! # Usage
//!
//! Identify the instrument at address 22 on `/dev/gpib0`:
//! ```bash
//! gpib-identify identify --address 22
//! HEWLETT-PACKARD,34401A,0,10-5-2
//! ```
//!
//! With diagnostics:
//! ```bash
//! gpib-identify --verbose identify --address 22
//! ```
//!
//! Without `--verbose` only the result or the first error is printed.
//! Settings may also come from a TOML file (`--config`) and `GPIB_*`
//! environment variables; command-line flags win.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use daq_driver_gpib::{Board, DeviceOptions, GpibConfig, Options, TracingLogger};

/// Placeholder until a file, the environment or a flag names the device.
const NO_ADDRESS: u32 = u32::MAX;

#[derive(Parser)]
#[command(name = "gpib-identify")]
#[command(about = "Query GPIB instruments through linux-gpib", long_about = None)]
struct Cli {
    /// Turn on logging. Without this, only the result or first error is printed.
    #[arg(long, global = true)]
    verbose: bool,

    /// Configuration file (TOML format)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identification string of a SCPI device
    Identify {
        #[command(flatten)]
        board: BoardArgs,

        /// The primary address of the GPIB device to query
        #[arg(long)]
        address: Option<u32>,

        /// Secondary address (0x60-0x7e), 0 for none
        #[arg(long)]
        secondary: Option<u32>,

        /// I/O timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List the primary addresses of devices listening on the bus
    Enumerate {
        #[command(flatten)]
        board: BoardArgs,
    },

    /// Show the state of the bus control lines
    Lines {
        #[command(flatten)]
        board: BoardArgs,
    },
}

#[derive(Args)]
struct BoardArgs {
    /// The board number. Defaults to zero, which corresponds to /dev/gpib0.
    #[arg(long)]
    board: Option<u32>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve(&cli)?;
    match cli.command {
        Commands::Identify { .. } => identify(&config),
        Commands::Enumerate { .. } => {
            let board = open_board(&config)?;
            let found = board.enumerate().context("Failed to enumerate devices")?;
            for pad in found {
                println!("{pad}");
            }
            Ok(())
        }
        Commands::Lines { .. } => {
            let board = open_board(&config)?;
            let lines = board.bus_lines().context("Failed to read bus lines")?;
            println!("{}", daq_driver_gpib::format_bus_lines(lines));
            Ok(())
        }
    }
}

/// Defaults, then the config file (if any) and `GPIB_*` variables, then flags.
fn resolve(cli: &Cli) -> Result<GpibConfig> {
    let defaults = GpibConfig::new(NO_ADDRESS);
    let mut config = match &cli.config {
        Some(path) => defaults
            .merged_with_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => defaults
            .merged_with_env()
            .context("Failed to read GPIB_* environment")?,
    };
    config.log |= cli.verbose;

    let board = match &cli.command {
        Commands::Identify {
            board,
            address,
            secondary,
            timeout_ms,
        } => {
            if let Some(address) = address {
                config.address = *address;
            }
            if let Some(secondary) = secondary {
                config.secondary = *secondary;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.timeout_ms = *timeout_ms;
            }
            board
        }
        Commands::Enumerate { board } | Commands::Lines { board } => board,
    };
    if let Some(index) = board.board {
        config.board = index;
    }
    Ok(config)
}

fn open_board(config: &GpibConfig) -> Result<Board> {
    let mut options = Options::new().timeout(config.timeout());
    if config.log {
        options = options.logger(TracingLogger);
    }
    Board::open(config.board, options)
        .with_context(|| format!("Failed to open board {}", config.board))
}

fn identify(config: &GpibConfig) -> Result<()> {
    if config.address == NO_ADDRESS {
        bail!("Please specify an --address!");
    }
    if let Err(e) = config.validate() {
        bail!(e);
    }

    let board = Board::open(config.board, config.options()?)
        .with_context(|| format!("Failed to open board {}", config.board))?;
    let device = board
        .open_device(config.device_address()?, &DeviceOptions::new())
        .context("Failed to open device")?;

    writeln!(&device, "*IDN?").context("Failed to write to device")?;

    let mut line = String::new();
    BufReader::new(&device)
        .read_line(&mut line)
        .context("Failed to read from device")?;
    println!("{}", line.trim_matches(&[' ', '\r', '\n'][..]));

    device.close().context("Failed to close device")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("gpib-identify").chain(args.iter().copied()))
    }

    #[test]
    fn test_env_selects_device_without_config_file() {
        Jail::expect_with(|jail| {
            jail.set_env("GPIB_ADDRESS", "22");
            jail.set_env("GPIB_TIMEOUT_MS", "250");
            let config = resolve(&parse(&["identify"])).unwrap();
            assert_eq!(config.address, 22);
            assert_eq!(config.timeout_ms, 250);
            assert!(!config.log);
            Ok(())
        });
    }

    #[test]
    fn test_flags_override_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file("gpib.toml", "board = 1\naddress = 5\ntimeout_ms = 100")?;
            jail.set_env("GPIB_ADDRESS", "9");
            let cli = parse(&[
                "--config",
                "gpib.toml",
                "--verbose",
                "identify",
                "--board",
                "3",
                "--address",
                "12",
            ]);
            let config = resolve(&cli).unwrap();
            assert_eq!(config.board, 3);
            assert_eq!(config.address, 12);
            assert_eq!(config.timeout_ms, 100);
            assert!(config.log);
            Ok(())
        });
    }

    #[test]
    fn test_missing_address_stays_unset() {
        Jail::expect_with(|_| {
            let config = resolve(&parse(&["identify"])).unwrap();
            assert_eq!(config.address, NO_ADDRESS);
            let err = identify(&config).unwrap_err();
            assert_eq!(err.to_string(), "Please specify an --address!");
            Ok(())
        });
    }

    #[test]
    fn test_board_flag_on_enumerate() {
        Jail::expect_with(|_| {
            let config = resolve(&parse(&["enumerate", "--board", "2"])).unwrap();
            assert_eq!(config.board, 2);
            Ok(())
        });
    }
}
