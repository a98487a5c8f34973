//! Write-behind result store.
//!
//! Case rows are inserted as results arrive; group and batch rows when they complete. All statements are
//! parameterized.

use std::path::Path;

use rusqlite::{Connection, params};

use super::{ResultSink, SinkError};
use crate::config::DatabaseConfig;
use crate::pipeline::{BatchId, BatchSummary, GroupSummary, TestResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS batches (
    id INTEGER PRIMARY KEY,
    num_cases INTEGER NOT NULL,
    num_success INTEGER NOT NULL,
    num_failures INTEGER NOT NULL,
    duration_nanos INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS "groups" (
    batch INTEGER NOT NULL,
    name TEXT NOT NULL,
    num_cases INTEGER NOT NULL,
    num_success INTEGER NOT NULL,
    num_failures INTEGER NOT NULL,
    duration_nanos INTEGER NOT NULL,
    PRIMARY KEY (batch, name)
);
CREATE TABLE IF NOT EXISTS cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch INTEGER NOT NULL,
    grp TEXT NOT NULL,
    name TEXT NOT NULL,
    is_success INTEGER NOT NULL,
    stdout TEXT NOT NULL,
    stderr TEXT NOT NULL,
    duration_nanos INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cases_batch ON cases(batch, grp);
"#;

const RESET: &str = r#"
DROP TABLE IF EXISTS cases;
DROP TABLE IF EXISTS "groups";
DROP TABLE IF EXISTS batches;
"#;

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, SinkError> {
        Self::open(&config.path, config.reset)
    }

    pub fn open(path: &Path, reset: bool) -> Result<Self, SinkError> {
        Self::init(Connection::open(path)?, reset)
    }

    pub fn in_memory() -> Result<Self, SinkError> {
        Self::init(Connection::open_in_memory()?, false)
    }

    fn init(conn: Connection, reset: bool) -> Result<Self, SinkError> {
        if reset {
            conn.execute_batch(RESET)?;
        }
        conn.execute_batch(SCHEMA)?;
        tracing::info!(reset, "result database ready");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn nanos(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn batch_key(batch: BatchId) -> i64 {
    i64::try_from(batch.0).unwrap_or(i64::MAX)
}

impl ResultSink for SqliteSink {
    fn case(&mut self, batch: BatchId, result: &TestResult) -> Result<(), SinkError> {
        self.conn.execute(
            "INSERT INTO cases (batch, grp, name, is_success, stdout, stderr, duration_nanos)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                batch_key(batch),
                result.group.as_str(),
                result.name,
                result.success,
                String::from_utf8_lossy(&result.stdout),
                String::from_utf8_lossy(&result.stderr),
                nanos(result.duration),
            ],
        )?;
        Ok(())
    }

    fn group(&mut self, batch: BatchId, summary: &GroupSummary) -> Result<(), SinkError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO \"groups\" (batch, name, num_cases, num_success, num_failures, duration_nanos)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                batch_key(batch),
                summary.group.as_str(),
                count(summary.expected),
                count(summary.tally.successes),
                count(summary.tally.failures),
                nanos(summary.tally.duration),
            ],
        )?;
        Ok(())
    }

    fn batch(&mut self, summary: &BatchSummary) -> Result<(), SinkError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO batches (id, num_cases, num_success, num_failures, duration_nanos)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                batch_key(summary.batch),
                count(summary.expected),
                count(summary.tally.successes),
                count(summary.tally.failures),
                nanos(summary.tally.duration),
            ],
        )?;
        Ok(())
    }
}
