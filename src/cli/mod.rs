//! CLI module for the rally server
//!
//! This module provides the command-line interface for running a server and talking to one.
//!
//! ## Commands
//!
//! - `serve` - Run the server (default when no subcommand is given)
//! - `submit <base_dir>` - Submit a batch to a running server and print its response
//! - `shutdown` - Ask a running server to shut down
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros. Server flags fall back to `RALLY_*` environment
//! variables. Command functions return `CliResult<T>` instead of calling `process::exit`. Only the top-level `run()`
//! function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{
    ConfigError, DEFAULT_ADMISSION_TIMEOUT, DEFAULT_BIND_ATTEMPTS, DEFAULT_PORT_RANGE, DEFAULT_QUEUE_CAPACITY,
    DeploymentMode, RallyConfig,
};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Render a diagnostic the way miette's fancy handler would.
    pub fn from_diagnostic(diagnostic: impl miette::Diagnostic + Send + Sync + 'static) -> Self {
        Self::failure(format!("{:?}", miette::Report::new(diagnostic)))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// A single-node test batch execution server
#[derive(Parser, Debug)]
#[command(name = "rally")]
#[command(version = VERSION)]
#[command(about = "A single-node test batch execution server", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Server flags (default action when no subcommand given)
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the server
    Serve(ServeArgs),

    /// Submit a batch to a running server
    Submit {
        /// Directory to search for test units
        #[arg(value_name = "BASE_DIR")]
        base_dir: PathBuf,
        #[command(flatten)]
        target: Target,
        /// Regex a unit's file name must fully match
        #[arg(long, value_name = "REGEX")]
        matcher: Option<String>,
        /// Extra library search path entry (repeatable)
        #[arg(long = "dep", value_name = "PATH")]
        dependencies: Vec<PathBuf>,
        /// Return once the batch is admitted instead of when it completes
        #[arg(long)]
        no_wait: bool,
    },

    /// Ask a running server to shut down
    Shutdown {
        #[command(flatten)]
        target: Target,
    },
}

/// Flags for `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Worker threads (default: available parallelism)
    #[arg(short, long, env = "RALLY_WORKERS")]
    pub workers: Option<usize>,

    /// Keep accepting batches instead of exiting after the first one
    #[arg(long)]
    pub long_lived: bool,

    /// Capacity of each pipeline queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Seconds a submission waits for the admission slot
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_ADMISSION_TIMEOUT.as_secs())]
    pub admission_timeout: u64,

    /// Lowest port to bind
    #[arg(long, default_value_t = *DEFAULT_PORT_RANGE.start())]
    pub port_min: u16,

    /// Highest port to bind
    #[arg(long, default_value_t = *DEFAULT_PORT_RANGE.end())]
    pub port_max: u16,

    /// Random ports to try before giving up
    #[arg(long, default_value_t = DEFAULT_BIND_ATTEMPTS)]
    pub bind_attempts: u32,

    /// Also write results to a SQLite database
    #[arg(long, env = "RALLY_WRITE_TO_DB")]
    pub write_to_db: bool,

    /// TOML file naming the database (`path`, `reset`)
    #[arg(long, value_name = "FILE", env = "RALLY_DB_CONFIG")]
    pub db_config: Option<PathBuf>,

    /// Directory for the program info file (default: ~/.rally)
    #[arg(long, value_name = "DIR")]
    pub info_dir: Option<PathBuf>,

    /// Disable logging
    #[arg(long)]
    pub no_logging: bool,

    #[arg(
        long,
        env = "RALLY_ENABLE_LOGGING",
        hide = true,
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enable_logging: bool,
}

impl ServeArgs {
    pub fn logging_enabled(&self) -> bool {
        self.enable_logging && !self.no_logging
    }

    pub fn to_config(&self) -> Result<RallyConfig, ConfigError> {
        let mut builder = RallyConfig::builder()
            .queue_capacity(self.queue_capacity)
            .mode(if self.long_lived {
                DeploymentMode::LongLived
            } else {
                DeploymentMode::SingleShot
            })
            .admission_timeout(Duration::from_secs(self.admission_timeout))
            .port_range(self.port_min..=self.port_max)
            .bind_attempts(self.bind_attempts)
            .write_to_db(self.write_to_db, self.db_config.clone())
            .enable_logging(self.logging_enabled());
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        if let Some(dir) = &self.info_dir {
            builder = builder.info_dir(dir);
        }
        builder.build()
    }
}

/// How a client finds the server.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Server process id, resolved through its program info file
    #[arg(long)]
    pub pid: Option<u32>,
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run(cli: Cli) {
    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        None => commands::serve(&cli.serve),
        Some(Command::Serve(args)) => commands::serve(&args),
        Some(Command::Submit {
            base_dir,
            target,
            matcher,
            dependencies,
            no_wait,
        }) => commands::submit(&target, &base_dir, matcher, &dependencies, !no_wait),
        Some(Command::Shutdown { target }) => commands::shutdown(&target),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default_is_serve() {
        let cli = Cli::try_parse_from(["rally", "--workers", "3", "--long-lived"]).unwrap();
        assert!(cli.command.is_none());
        let config = cli.serve.to_config().unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.mode, DeploymentMode::LongLived);
    }

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::try_parse_from(["rally", "serve", "--no-logging", "--port-min", "50000", "--port-max", "50010"])
            .unwrap();
        if let Some(Command::Serve(args)) = cli.command {
            let config = args.to_config().unwrap();
            assert_eq!(config.port_range, 50000..=50010);
            assert!(!config.enable_logging);
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_cli_serve_validation_surfaces_config_error() {
        let cli = Cli::try_parse_from(["rally", "serve", "--write-to-db"]).unwrap();
        if let Some(Command::Serve(args)) = cli.command {
            assert!(matches!(args.to_config(), Err(ConfigError::MissingDbConfig)));
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_cli_parse_submit() {
        let cli = Cli::try_parse_from([
            "rally", "submit", "target/debug/deps", "--port", "50123", "--dep", "/opt/lib", "--no-wait",
        ])
        .unwrap();
        if let Some(Command::Submit {
            target,
            dependencies,
            no_wait,
            matcher,
            ..
        }) = cli.command
        {
            assert_eq!(target.port, Some(50123));
            assert_eq!(dependencies, vec![PathBuf::from("/opt/lib")]);
            assert!(no_wait);
            assert!(matcher.is_none());
        } else {
            panic!("Expected Submit command");
        }
    }

    #[test]
    fn test_cli_client_target_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["rally", "shutdown"]).is_err());
        assert!(Cli::try_parse_from(["rally", "shutdown", "--port", "1", "--pid", "2"]).is_err());
        let cli = Cli::try_parse_from(["rally", "shutdown", "--pid", "4242"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Shutdown { target }) if target.pid == Some(4242)));
    }
}
