//! Human-readable result blocks.
//!
//! ```text
//!
//! TEST RESULT:
//!     Test: adds, Group: math/Arith
//!     SUCCESS, duration: 0.0004
//!     ---- stdout ----
//! 2 + 2 = 4
//!     ----------------
//! ```
//!
//! Group and batch summaries follow the same shape under `GROUP RESULT:` and `BATCH RESULT:`.

use std::io::{self, Stdout, Write};

use super::{ResultSink, SinkError, seconds};
use crate::pipeline::{BatchId, BatchSummary, GroupSummary, TestResult};

pub struct ConsoleSink<W: Write + Send = Stdout> {
    out: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn section(&mut self, title: &str, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "\t---- {title} ----")?;
        self.out.write_all(bytes)?;
        if !bytes.ends_with(b"\n") {
            writeln!(self.out)?;
        }
        writeln!(self.out, "\t----------------")
    }
}

impl<W: Write + Send> ResultSink for ConsoleSink<W> {
    fn case(&mut self, _batch: BatchId, result: &TestResult) -> Result<(), SinkError> {
        let status = if result.success { "SUCCESS" } else { "FAILURE" };
        writeln!(self.out, "\nTEST RESULT:")?;
        writeln!(self.out, "\tTest: {}, Group: {}", result.name, result.group)?;
        writeln!(self.out, "\t{status}, duration: {}", seconds(result.duration))?;
        if let Some(failure) = &result.failure {
            writeln!(self.out, "\tFailure: {failure}")?;
        }
        self.section("stdout", &result.stdout)?;
        self.section("stderr", &result.stderr)?;
        self.out.flush()?;
        Ok(())
    }

    fn group(&mut self, _batch: BatchId, summary: &GroupSummary) -> Result<(), SinkError> {
        writeln!(self.out, "\nGROUP RESULT:")?;
        writeln!(self.out, "\tGroup: {}", summary.group)?;
        writeln!(
            self.out,
            "\tTests: {}, successes: {}, failures: {}",
            summary.expected, summary.tally.successes, summary.tally.failures
        )?;
        writeln!(self.out, "\tDuration: {}", seconds(summary.tally.duration))?;
        self.out.flush()?;
        Ok(())
    }

    fn batch(&mut self, summary: &BatchSummary) -> Result<(), SinkError> {
        writeln!(self.out, "\nBATCH RESULT:")?;
        writeln!(self.out, "\tBatch: {}, Groups: {}", summary.batch, summary.groups)?;
        writeln!(
            self.out,
            "\tTests: {}, successes: {}, failures: {}",
            summary.expected, summary.tally.successes, summary.tally.failures
        )?;
        writeln!(self.out, "\tDuration: {}", seconds(summary.tally.duration))?;
        self.out.flush()?;
        Ok(())
    }
}
