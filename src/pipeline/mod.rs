//! The staged batch pipeline: admission, execution, aggregation.
//!
//! ```text
//!  ConnectionServer ──submit──▶ BatchAdmitter ──TestCase──▶ Worker[0..N] ──AggregatorEvent──▶ ResultAggregator
//!                                     │                                                           ▲
//!                                     └──────────── EmptyBatch (result queue 0) ──────────────────┘
//! ```
//!
//! Stages never call each other. Everything crosses a [`BoundedClosableQueue`], so closing the queues is enough to
//! stop the whole pipeline.
//!
//! ## Notes
//!
//! - Worker `i` owns case queue `i` and result queue `i`. Distribution is strict round-robin starting at queue 0.
//! - [`BatchProgress`] is the only state shared outside a queue hand-off.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod admitter;
pub mod aggregator;
pub mod progress;
pub mod worker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rally_core::{BoundedClosableQueue, QueueError};

use crate::catalog::Unit;
use crate::server::ReplyRoute;

pub use admitter::{AdmitError, BatchAdmitter, ResolveError, TrySubmitError};
pub use aggregator::ResultAggregator;
pub use progress::{BatchPhase, BatchProgress, BatchSummary, GroupSummary, ProgressError, Recorded, Tally};
pub use worker::Worker;

/// Per-item timeout for stage-to-stage `put`s. Timeouts are retried while the producer is running.
pub(crate) const PUT_RETRY: Duration = Duration::from_secs(1);

// ============================================================================
// Identifiers
// ============================================================================

/// Sequential id handed out at admission, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A group is the set of cases discovered from one unit. Its id is the unit's path relative to the batch's base
/// directory, extension kept, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Work items
// ============================================================================

/// One case to run. Consumed by exactly one worker and never retried.
pub struct TestCase {
    pub unit: Arc<Unit>,
    pub name: String,
    pub progress: Arc<BatchProgress>,
    pub reply: ReplyRoute,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("batch", &self.progress.id())
            .field("group", &self.unit.group)
            .field("name", &self.name)
            .finish()
    }
}

/// Outcome of one case, with the output it produced.
#[derive(Debug)]
pub struct TestResult {
    pub group: GroupId,
    pub name: String,
    pub success: bool,
    pub duration: Duration,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub failure: Option<String>,
    pub progress: Arc<BatchProgress>,
    pub reply: ReplyRoute,
}

/// What travels on a result queue.
#[derive(Debug)]
pub enum AggregatorEvent {
    Result(TestResult),
    /// A batch that resolved to zero cases. Sent by the admitter on result queue 0 instead of touching any worker.
    EmptyBatch {
        progress: Arc<BatchProgress>,
        reply: ReplyRoute,
    },
}

impl AggregatorEvent {
    pub fn reply(&self) -> &ReplyRoute {
        match self {
            AggregatorEvent::Result(result) => &result.reply,
            AggregatorEvent::EmptyBatch { reply, .. } => reply,
        }
    }
}

// ============================================================================
// Plumbing
// ============================================================================

pub type CaseQueue = BoundedClosableQueue<TestCase>;
pub type ResultQueue = BoundedClosableQueue<AggregatorEvent>;

/// The 2N queues connecting admitter, workers and aggregator.
#[derive(Debug, Clone)]
pub struct PipelineQueues {
    pub cases: Vec<Arc<CaseQueue>>,
    pub results: Vec<Arc<ResultQueue>>,
}

impl PipelineQueues {
    pub fn new(workers: usize, capacity: usize) -> Result<Self, QueueError> {
        let mut cases = Vec::with_capacity(workers);
        let mut results = Vec::with_capacity(workers);
        for _ in 0..workers {
            cases.push(Arc::new(BoundedClosableQueue::with_capacity(capacity)?));
            results.push(Arc::new(BoundedClosableQueue::with_capacity(capacity)?));
        }
        Ok(Self { cases, results })
    }

    pub fn close_all(&self) {
        for queue in &self.cases {
            queue.close();
        }
        for queue in &self.results {
            queue.close();
        }
    }
}

/// Cooperative stop flag for one pipeline thread.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
