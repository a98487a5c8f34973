//! Aggregation stage: counts results, detects completion, answers the client.
//!
//! The aggregator round-robins a short `take` across every result queue. Each result is recorded in its batch's
//! [`BatchProgress`] and published to every sink at once. Group and batch summaries follow as soon as the counters
//! say they are complete. When a batch completes, its success response goes out through the batch's reply route.
//!
//! ## Notes
//!
//! - Zero-case groups have no results to trigger them; their summaries are published when the batch completes,
//!   ahead of the batch summary.
//! - In single-shot mode the aggregator stops after its first completed batch.
//! - Any sink or bookkeeping error is fatal. The client of the event being handled gets a best-effort
//!   `Unexpected error` response before the fault is raised.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use rally_core::{Fault, NotifyOnly, PanicOnly, TakeError};
use thiserror::Error;

use super::{AggregatorEvent, BatchPhase, BatchProgress, ProgressError, ResultQueue, RunFlag, TestResult};
use crate::config::DeploymentMode;
use crate::output::{ResultSink, SinkError};
use crate::protocol::WireResponse;
use crate::server::ReplyRoute;

const COMPONENT: &str = "aggregator";
const POLL_TIMEOUT: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct ResultAggregator {
    queues: Vec<Arc<ResultQueue>>,
    sinks: Vec<Box<dyn ResultSink>>,
    mode: DeploymentMode,
    running: RunFlag,
    faults: PanicOnly,
    finished: NotifyOnly,
}

impl ResultAggregator {
    pub fn new(
        queues: Vec<Arc<ResultQueue>>,
        sinks: Vec<Box<dyn ResultSink>>,
        mode: DeploymentMode,
        running: RunFlag,
        faults: PanicOnly,
        finished: NotifyOnly,
    ) -> Self {
        Self {
            queues,
            sinks,
            mode,
            running,
            faults,
            finished,
        }
    }

    /// The aggregator thread's body.
    pub fn run(mut self, barrier: &Barrier) {
        barrier.wait();
        tracing::debug!(queues = self.queues.len(), "aggregator started");

        let mut closed = vec![false; self.queues.len()];
        let mut next = 0;
        while self.running.is_running() && !closed.iter().all(|c| *c) {
            let index = next;
            next = (next + 1) % self.queues.len();
            if closed[index] {
                continue;
            }

            let event = match self.queues[index].take(POLL_TIMEOUT) {
                Ok(event) => event,
                Err(TakeError::Timeout) => continue,
                Err(TakeError::Closed) => {
                    closed[index] = true;
                    continue;
                }
            };

            let reply = event.reply().clone();
            match self.handle(event) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    if let Err(send_err) = reply.send(WireResponse::failure(format!("Unexpected error: {e}"))) {
                        tracing::debug!(error = %send_err, "error response not delivered");
                    }
                    self.faults.panic(Fault::new(COMPONENT, e.to_string()));
                    break;
                }
            }
        }
        tracing::debug!("aggregator exiting");
    }

    fn handle(&mut self, event: AggregatorEvent) -> Result<Flow, AggregatorError> {
        match event {
            AggregatorEvent::Result(result) => self.on_result(result),
            AggregatorEvent::EmptyBatch { progress, reply } => self.complete(&progress, &reply),
        }
    }

    fn on_result(&mut self, result: TestResult) -> Result<Flow, AggregatorError> {
        let progress = Arc::clone(&result.progress);
        let batch = progress.id();
        progress.set_phase(BatchPhase::Aggregating);

        let recorded = progress.record(&result.group, result.success, result.duration)?;
        for sink in &mut self.sinks {
            sink.case(batch, &result)?;
        }

        if recorded.group_complete {
            if let Some(summary) = progress.group_summary(&result.group) {
                tracing::debug!(batch_id = %batch, group = %summary.group, "group complete");
                for sink in &mut self.sinks {
                    sink.group(batch, &summary)?;
                }
            }
        }

        if recorded.batch_complete {
            return self.complete(&progress, &result.reply);
        }
        Ok(Flow::Continue)
    }

    fn complete(&mut self, progress: &BatchProgress, reply: &ReplyRoute) -> Result<Flow, AggregatorError> {
        let batch = progress.id();
        for summary in progress.empty_groups() {
            for sink in &mut self.sinks {
                sink.group(batch, &summary)?;
            }
        }
        let summary = progress.batch_summary();
        for sink in &mut self.sinks {
            sink.batch(&summary)?;
        }
        progress.set_phase(BatchPhase::Complete);
        tracing::info!(
            batch_id = %batch,
            cases = summary.expected,
            successes = summary.tally.successes,
            failures = summary.tally.failures,
            "batch complete"
        );

        if let Err(e) = reply.send(WireResponse::suite(batch)) {
            tracing::warn!(batch_id = %batch, error = %e, "completion response not delivered");
        }

        match self.mode {
            DeploymentMode::LongLived => Ok(Flow::Continue),
            DeploymentMode::SingleShot => {
                // a detached client was answered at admission; nothing on the server side will end the run
                if reply.is_detached() {
                    self.finished.request_graceful_shutdown();
                }
                Ok(Flow::Stop)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
