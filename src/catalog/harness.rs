//! libtest executables as units.
//!
//! Discovery runs `<unit> --list --format terse` and keeps every `<name>: test` line. Invocation runs
//! `<unit> --exact <name> --nocapture --test-threads=1`, forwards the child's output into the worker's capture sink,
//! and treats a non-zero exit as failure.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use super::{CaseFailure, CatalogError, TestCatalog, Unit};
use crate::capture::{self, Stream};

#[cfg(target_os = "macos")]
const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(windows)]
const LIBRARY_PATH_VAR: &str = "PATH";
#[cfg(not(any(target_os = "macos", windows)))]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

#[derive(Debug, Default, Clone)]
pub struct HarnessCatalog;

impl HarnessCatalog {
    pub fn new() -> Self {
        Self
    }

    fn command(unit: &Unit) -> Command {
        let mut command = Command::new(&unit.path);
        command.stdin(Stdio::null());
        if let Some(dir) = unit.path.parent() {
            command.current_dir(dir);
        }
        if let Some(search_path) = library_search_path(&unit.dependencies) {
            command.env(LIBRARY_PATH_VAR, search_path);
        }
        command
    }
}

impl TestCatalog for HarnessCatalog {
    fn discover(&self, unit: &Unit) -> Result<Vec<String>, CatalogError> {
        let output = Self::command(unit)
            .args(["--list", "--format", "terse"])
            .output()
            .map_err(|source| CatalogError::Spawn {
                unit: unit.path.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(CatalogError::ListFailed {
                unit: unit.path.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let cases = parse_terse_listing(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(unit = %unit.path.display(), cases = cases.len(), "listed harness cases");
        Ok(cases)
    }

    fn invoke(&self, unit: &Unit, case: &str) -> Result<(), CaseFailure> {
        let Output { status, stdout, stderr } = Self::command(unit)
            .args(["--exact", case, "--nocapture", "--test-threads=1"])
            .output()
            .map_err(|e| CaseFailure::new(format!("failed to launch `{}`: {e}", unit.path.display())))?;
        capture::forward(Stream::Stdout, &stdout);
        capture::forward(Stream::Stderr, &stderr);
        if status.success() {
            Ok(())
        } else {
            Err(CaseFailure::new(format!("test process exited with {status}")))
        }
    }
}

/// Keeps the names from `name: test` lines; benches and summary lines are skipped.
pub fn parse_terse_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix(": test"))
        .map(str::to_string)
        .collect()
}

/// `dependencies` followed by whatever the variable already holds.
fn library_search_path(dependencies: &[PathBuf]) -> Option<OsString> {
    let inherited = env::var_os(LIBRARY_PATH_VAR);
    let inherited = inherited.iter().flat_map(env::split_paths);
    match env::join_paths(dependencies.iter().cloned().chain(inherited)) {
        Ok(joined) => Some(joined),
        Err(e) => {
            tracing::warn!(error = %e, "dependency path not usable in {LIBRARY_PATH_VAR}, leaving it unchanged");
            None
        }
    }
}
