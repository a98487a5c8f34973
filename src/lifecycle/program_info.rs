//! The program info file: how clients find a running server's port.
//!
//! The port is written as decimal text to `<dir>/info_<pid>`, where `<dir>` defaults to `~/.rally`. The file lives
//! exactly as long as the [`ProgramInfo`] that wrote it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::LifecycleError;

const DIR_NAME: &str = ".rally";
const FILE_PREFIX: &str = "info_";

/// `~/.rally`, or `None` when the home directory cannot be determined.
pub fn default_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DIR_NAME))
}

pub fn path_for(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{pid}"))
}

/// Reads the port a server with process id `pid` published in `dir`.
pub fn read_port(dir: &Path, pid: u32) -> Result<u16, LifecycleError> {
    let path = path_for(dir, pid);
    let text = fs::read_to_string(&path).map_err(|source| LifecycleError::ProgramInfo {
        path: path.clone(),
        source,
    })?;
    text.trim().parse().map_err(|_| LifecycleError::ProgramInfo {
        path,
        source: io::Error::new(io::ErrorKind::InvalidData, format!("`{}` is not a port", text.trim())),
    })
}

#[derive(Debug)]
pub struct ProgramInfo {
    path: PathBuf,
}

impl ProgramInfo {
    /// Writes `port` to `<dir>/info_<pid>`, creating `dir` if needed.
    pub fn write(dir: &Path, pid: u32, port: u16) -> Result<Self, LifecycleError> {
        let path = path_for(dir, pid);
        fs::create_dir_all(dir)
            .and_then(|()| fs::write(&path, port.to_string()))
            .map_err(|source| LifecycleError::ProgramInfo {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), port, "program info written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProgramInfo {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove program info");
        }
    }
}
