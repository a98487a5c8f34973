//! Execution stage: one thread per case queue.
//!
//! A worker takes a case, installs a fresh capture sink on its thread, invokes the catalog under `catch_unwind`, and
//! publishes a [`TestResult`] with the captured output and wall-clock duration. A case that returns an error or panics
//! is a failed result, never a fault.
//!
//! Faults are reserved for the worker's own plumbing: a result queue that closes while the worker is still running
//! means the aggregator is gone and nothing this worker produces can be delivered.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use rally_core::{Fault, PanicOnly, PutError, TakeError};

use super::{AggregatorEvent, CaseQueue, PUT_RETRY, ResultQueue, RunFlag, TestCase, TestResult};
use crate::capture::CaptureGuard;
use crate::catalog::TestCatalog;

/// How long a worker waits on its case queue before re-checking its run flag.
const TAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Worker {
    index: usize,
    cases: Arc<CaseQueue>,
    results: Arc<ResultQueue>,
    catalog: Arc<dyn TestCatalog>,
    running: RunFlag,
    faults: PanicOnly,
}

impl Worker {
    pub fn new(
        index: usize,
        cases: Arc<CaseQueue>,
        results: Arc<ResultQueue>,
        catalog: Arc<dyn TestCatalog>,
        running: RunFlag,
        faults: PanicOnly,
    ) -> Self {
        Self {
            index,
            cases,
            results,
            catalog,
            running,
            faults,
        }
    }

    pub fn name(&self) -> String {
        format!("worker-{}", self.index)
    }

    /// The worker thread's body. Returns when the case queue closes or the run flag drops.
    pub fn run(&self, barrier: &Barrier) {
        barrier.wait();
        tracing::debug!(worker = self.index, "worker started");
        while self.running.is_running() {
            let case = match self.cases.take(TAKE_TIMEOUT) {
                Ok(case) => case,
                Err(TakeError::Timeout) => continue,
                Err(TakeError::Closed) => break,
            };
            let result = self.execute(case);
            if !self.publish(result) {
                break;
            }
        }
        tracing::debug!(worker = self.index, "worker exiting");
    }

    /// Runs one case with this thread's output captured.
    pub fn execute(&self, case: TestCase) -> TestResult {
        let TestCase {
            unit,
            name,
            progress,
            reply,
        } = case;
        tracing::trace!(
            worker = self.index,
            batch_id = %progress.id(),
            group = %unit.group,
            case = %name,
            "running case"
        );

        let capture = CaptureGuard::install();
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.catalog.invoke(&unit, &name)));
        let duration = started.elapsed();
        let captured = capture.finish();

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => Some(failure.message),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };

        TestResult {
            group: unit.group.clone(),
            name,
            success: failure.is_none(),
            duration,
            stdout: captured.stdout,
            stderr: captured.stderr,
            failure,
            progress,
            reply,
        }
    }

    /// Hands a result to the aggregator. Returns false when the worker should stop.
    fn publish(&self, result: TestResult) -> bool {
        let mut event = AggregatorEvent::Result(result);
        loop {
            match self.results.put(event, PUT_RETRY) {
                Ok(()) => return true,
                Err(PutError::Timeout(back)) => {
                    if !self.running.is_running() {
                        return false;
                    }
                    event = back;
                }
                Err(PutError::Closed(_)) => {
                    if self.running.is_running() {
                        self.faults
                            .panic(Fault::new(self.name(), "result queue closed while worker was running"));
                    }
                    return false;
                }
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("running", &self.running.is_running())
            .finish()
    }
}

/// Extracts the message from a `catch_unwind` payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}
