//! Server configuration.
//!
//! [`RallyConfig`] is assembled once at startup (CLI flags with environment fallbacks, see [`crate::cli`]) and then
//! passed by reference to every component. Nothing reads configuration from globals after startup.
//!
//! ## Notes
//!
//! - Validation lives in [`RallyConfigBuilder::build`]; a built config is always usable.
//! - The database sink has its own small TOML file, [`DatabaseConfig`].

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

/// Per-queue capacity between pipeline stages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 262_144;
/// How long a submission waits for the single-flight admission slot.
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);
/// IANA dynamic port range.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 49152..=65535;
pub const DEFAULT_BIND_ATTEMPTS: u32 = 32;

/// Whether the process exits after its first batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    /// Serve one batch, respond, and tear down.
    #[default]
    SingleShot,
    /// Keep accepting batches until shut down.
    LongLived,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    #[diagnostic(code(rally::config::zero_workers), help("pass --workers N with N >= 1, or unset RALLY_WORKERS"))]
    ZeroWorkers,

    #[error("queue capacity must be at least 1")]
    #[diagnostic(code(rally::config::zero_capacity))]
    ZeroQueueCapacity,

    #[error("port range {min}..={max} is empty")]
    #[diagnostic(code(rally::config::empty_port_range))]
    EmptyPortRange { min: u16, max: u16 },

    #[error("bind attempts must be at least 1")]
    #[diagnostic(code(rally::config::zero_bind_attempts))]
    ZeroBindAttempts,

    #[error("writing to the database requires a database config file")]
    #[diagnostic(
        code(rally::config::missing_db_config),
        help("pass --db-config FILE or set RALLY_DB_CONFIG")
    )]
    MissingDbConfig,

    #[error("failed to read database config `{}`", path.display())]
    #[diagnostic(code(rally::config::read_db_config))]
    ReadDbConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid database config `{}`", path.display())]
    #[diagnostic(code(rally::config::parse_db_config), help("expected a TOML file with `path` and optional `reset`"))]
    ParseDbConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct RallyConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub mode: DeploymentMode,
    pub admission_timeout: Duration,
    pub port_range: RangeInclusive<u16>,
    pub bind_attempts: u32,
    pub write_to_db: bool,
    pub db_config: Option<PathBuf>,
    pub enable_logging: bool,
    /// Directory for the program info file. `None` means `~/.rally`.
    pub info_dir: Option<PathBuf>,
}

impl RallyConfig {
    pub fn builder() -> RallyConfigBuilder {
        RallyConfigBuilder::default()
    }
}

/// Worker count when none is configured: the machine's available parallelism.
pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct RallyConfigBuilder {
    workers: Option<usize>,
    queue_capacity: usize,
    mode: DeploymentMode,
    admission_timeout: Duration,
    port_range: RangeInclusive<u16>,
    bind_attempts: u32,
    write_to_db: bool,
    db_config: Option<PathBuf>,
    enable_logging: bool,
    info_dir: Option<PathBuf>,
}

impl Default for RallyConfigBuilder {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mode: DeploymentMode::default(),
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            port_range: DEFAULT_PORT_RANGE,
            bind_attempts: DEFAULT_BIND_ATTEMPTS,
            write_to_db: false,
            db_config: None,
            enable_logging: true,
            info_dir: None,
        }
    }
}

impl RallyConfigBuilder {
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range = range;
        self
    }

    pub fn bind_attempts(mut self, attempts: u32) -> Self {
        self.bind_attempts = attempts;
        self
    }

    pub fn write_to_db(mut self, enabled: bool, db_config: Option<PathBuf>) -> Self {
        self.write_to_db = enabled;
        self.db_config = db_config;
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn info_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.info_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<RallyConfig, ConfigError> {
        let workers = self.workers.unwrap_or_else(default_workers);
        if workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.port_range.is_empty() {
            return Err(ConfigError::EmptyPortRange {
                min: *self.port_range.start(),
                max: *self.port_range.end(),
            });
        }
        if self.bind_attempts == 0 {
            return Err(ConfigError::ZeroBindAttempts);
        }
        if self.write_to_db && self.db_config.is_none() {
            return Err(ConfigError::MissingDbConfig);
        }
        Ok(RallyConfig {
            workers,
            queue_capacity: self.queue_capacity,
            mode: self.mode,
            admission_timeout: self.admission_timeout,
            port_range: self.port_range,
            bind_attempts: self.bind_attempts,
            write_to_db: self.write_to_db,
            db_config: self.db_config,
            enable_logging: self.enable_logging,
            info_dir: self.info_dir,
        })
    }
}

// ============================================================================
// Database sink config
// ============================================================================

/// Contents of the `--db-config` TOML file.
///
/// ```toml
/// path = "/var/lib/rally/results.db"
/// reset = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Drop and recreate the result tables at startup.
    #[serde(default = "default_reset")]
    pub reset: bool,
}

fn default_reset() -> bool {
    true
}

impl DatabaseConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadDbConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::ParseDbConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}
