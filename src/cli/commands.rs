//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::HarnessCatalog;
use crate::config::RallyConfig;
use crate::lifecycle::{self, LifecycleError, program_info};
use crate::protocol::{RequestFrame, RunSuiteBody, WireResponse};

use super::{CliError, CliResult, ExitCode, ServeArgs, Target};

// ============================================================================
// Server
// ============================================================================

/// Run a server over cargo-built test executables until it shuts down.
pub fn serve(args: &ServeArgs) -> CliResult<ExitCode> {
    let config = args.to_config().map_err(CliError::from_diagnostic)?;
    init_logging(&config);
    match lifecycle::run(config, Arc::new(HarnessCatalog::new())) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => Err(CliError::from_diagnostic(e)),
    }
}

/// Installs the structured log subscriber once, if the config asks for it. Client commands never log.
fn init_logging(config: &RallyConfig) {
    if !config.enable_logging {
        return;
    }
    // Initialize structured logging with env-based filter, defaulting to info
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

// ============================================================================
// Client
// ============================================================================

/// Submit a batch and print the server's response.
///
/// Relative paths are made absolute against this process's working directory, since the server has its own.
pub fn submit(
    target: &Target,
    base_dir: &Path,
    matcher: Option<String>,
    dependencies: &[PathBuf],
    blocking: bool,
) -> CliResult<ExitCode> {
    let dependencies = if dependencies.is_empty() {
        None
    } else {
        Some(dependencies.iter().map(|dep| absolute(dep)).collect::<CliResult<Vec<_>>>()?)
    };
    let frame = RequestFrame::RunSuite {
        body: RunSuiteBody {
            base_dir: absolute(base_dir)?,
            matcher,
            dependencies,
            is_blocking: Some(blocking),
        },
    };
    send(target, &frame)
}

/// Ask the server to shut down once this request is acknowledged.
pub fn shutdown(target: &Target) -> CliResult<ExitCode> {
    send(target, &RequestFrame::Shutdown)
}

fn send(target: &Target, frame: &RequestFrame) -> CliResult<ExitCode> {
    let port = resolve_port(target)?;
    let encoded = frame
        .encode()
        .map_err(|e| CliError::failure(format!("Error encoding request: {e}")))?;
    let response = exchange(port, &encoded)?;
    println!("{}", response.encode());
    if response.is_success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn resolve_port(target: &Target) -> CliResult<u16> {
    if let Some(port) = target.port {
        return Ok(port);
    }
    let Some(pid) = target.pid else {
        return Err(CliError::failure("Error: pass --port or --pid"));
    };
    let dir = program_info::default_dir().ok_or_else(|| CliError::from_diagnostic(LifecycleError::NoHomeDir))?;
    program_info::read_port(&dir, pid).map_err(CliError::from_diagnostic)
}

/// Sends one frame and reads one response line.
pub fn exchange(port: u16, frame: &str) -> CliResult<WireResponse> {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
        .map_err(|e| CliError::failure(format!("Error connecting to port {port}: {e}")))?;
    stream
        .write_all(format!("{frame}\n").as_bytes())
        .map_err(|e| CliError::failure(format!("Error sending request: {e}")))?;

    let mut line = String::new();
    BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| CliError::failure(format!("Error reading response: {e}")))?;
    if line.is_empty() {
        return Err(CliError::failure("Error: server closed the connection without responding"));
    }
    WireResponse::decode(line.trim_end()).map_err(|e| CliError::failure(format!("Error decoding response: {e}")))
}

fn absolute(path: &Path) -> CliResult<String> {
    std::path::absolute(path)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|e| CliError::failure(format!("Error resolving `{}`: {e}", path.display())))
}
