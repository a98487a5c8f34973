//! Where aggregated results go.
//!
//! The aggregator publishes three record kinds through every configured [`ResultSink`], as soon as each is known:
//!
//! - a case, when its result arrives;
//! - a group summary, when the group's last result arrives (or, for zero-case groups, when the batch completes);
//! - a batch summary, once every group is complete.
//!
//! A sink error is fatal to the aggregator.

pub mod console;
pub mod sqlite;

use thiserror::Error;

use crate::config::ConfigError;
use crate::pipeline::{BatchId, BatchSummary, GroupSummary, TestResult};

pub use console::ConsoleSink;
pub use sqlite::SqliteSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("console write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("database write failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub trait ResultSink: Send {
    fn case(&mut self, batch: BatchId, result: &TestResult) -> Result<(), SinkError>;

    fn group(&mut self, batch: BatchId, summary: &GroupSummary) -> Result<(), SinkError>;

    fn batch(&mut self, summary: &BatchSummary) -> Result<(), SinkError>;
}

/// Formats nanoseconds as seconds with four decimals, e.g. `0.0125`.
pub fn seconds(duration: std::time::Duration) -> String {
    format!("{:.4}", duration.as_secs_f64())
}
