//! Test catalog capability: how units turn into runnable cases.
//!
//! The pipeline never knows what a "test" is. It hands a [`Unit`] to the configured [`TestCatalog`] to list its cases,
//! and later asks the catalog to invoke one case by name on a worker thread.
//!
//! ## Implementations
//!
//! - [`HarnessCatalog`]: units are libtest executables built by cargo; cases run as child processes.
//! - [`RegistryCatalog`]: units are matched to closures registered in-process, keyed by group id.

pub mod harness;
pub mod registry;

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::GroupId;

pub use harness::HarnessCatalog;
pub use registry::RegistryCatalog;

/// One file that matched a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub path: PathBuf,
    pub group: GroupId,
    /// Library search path entries needed to load the unit.
    pub dependencies: Vec<PathBuf>,
}

/// Discovery failed. This aborts the whole batch.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to launch `{}`: {source}", unit.display())]
    Spawn {
        unit: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("listing cases of `{}` failed ({status}): {stderr}", unit.display())]
    ListFailed {
        unit: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("discovery rejected group `{group}`: {message}")]
    Rejected { group: GroupId, message: String },
}

/// One case failed. Recorded as a failed result, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CaseFailure {
    pub message: String,
}

impl CaseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Discovers and invokes the cases of a unit.
///
/// Invocation happens on worker threads with the thread's output captured, so implementations should write through
/// [`crate::capture`] rather than straight to the process streams.
pub trait TestCatalog: Send + Sync {
    /// Lists the case names `unit` provides. An empty list is valid.
    fn discover(&self, unit: &Unit) -> Result<Vec<String>, CatalogError>;

    /// Runs one case. `Err` marks it failed. A panic also marks it failed; the worker catches it.
    fn invoke(&self, unit: &Unit, case: &str) -> Result<(), CaseFailure>;
}
