//! Single-flight admission, resolution and round-robin distribution.
//!
//! The connection loop claims the one admission slot with [`BatchAdmitter::try_submit`], which never blocks: a busy
//! slot hands the submission back for a later attempt. [`BatchAdmitter::submit`] is the blocking form for callers
//! that can afford to wait. Either way the next [`BatchId`] is allocated and the submission is parked in the slot.
//! The admitter's own thread ([`BatchAdmitter::run`]) then resolves it into cases and distributes them, freeing the
//! slot when it is done.
//!
//! ## Resolution
//!
//! 1. `base_dir` must be an existing directory.
//! 2. Every file below it whose file name fully matches the submission's matcher becomes a [`Unit`]; the walk is
//!    sorted by file name so batches resolve deterministically.
//! 3. The catalog lists each unit's cases and the group's expected count is declared immediately. A unit's group is
//!    its path relative to `base_dir`, so every unit is its own group.
//! 4. The progress is sealed before the first case is queued, so a fast worker can never complete a batch early.
//!
//! A batch that resolves to zero cases skips the workers: an [`AggregatorEvent::EmptyBatch`] goes straight to result
//! queue 0.
//!
//! Resolution errors are fatal: the batch's client gets a best-effort error response and the fault is raised.
//!
//! Distribution puts each case with a bounded timeout and retries while the admitter is alive, so a full worker
//! queue only slows distribution down. [`BatchAdmitter::shutdown`] ends a distribution that is stuck behind one.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rally_core::{Fault, PanicOnly, PutError};
use thiserror::Error;
use walkdir::WalkDir;

use super::{
    AggregatorEvent, BatchId, BatchPhase, BatchProgress, CaseQueue, GroupId, PUT_RETRY, ProgressError,
    ResultQueue, TestCase,
};
use crate::catalog::{CatalogError, TestCatalog, Unit};
use crate::protocol::{Submission, WireResponse};
use crate::server::ReplyRoute;

const COMPONENT: &str = "admitter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmitError {
    #[error("Timed out waiting for another submission to finish resolving")]
    Timeout,

    #[error("Server is shutting down")]
    Shutdown,
}

/// Why [`BatchAdmitter::try_submit`] did not admit.
#[derive(Debug)]
pub enum TrySubmitError {
    /// Another submission holds the slot. Both halves are handed back for a later attempt.
    Busy(Submission, ReplyRoute),
    Shutdown,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("base directory `{}` does not exist", .0.display())]
    MissingBaseDir(PathBuf),

    #[error("base directory `{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to walk base directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

struct Pending {
    batch: BatchId,
    submission: Submission,
    reply: ReplyRoute,
}

struct Slot {
    pending: Option<Pending>,
    occupied: bool,
    next_batch: u64,
    alive: bool,
}

/// Resolved units with the case names each one provides.
type Resolved = Vec<(Arc<Unit>, Vec<String>)>;

pub struct BatchAdmitter {
    slot: Mutex<Slot>,
    changed: Condvar,
    catalog: Arc<dyn TestCatalog>,
    case_queues: Vec<Arc<CaseQueue>>,
    empty_batch_queue: Arc<ResultQueue>,
    faults: PanicOnly,
    on_release: Mutex<Option<ReleaseHook>>,
}

type ReleaseHook = Box<dyn Fn() + Send + Sync>;

impl BatchAdmitter {
    /// `case_queues` must be non-empty; `empty_batch_queue` is result queue 0.
    pub fn new(
        catalog: Arc<dyn TestCatalog>,
        case_queues: Vec<Arc<CaseQueue>>,
        empty_batch_queue: Arc<ResultQueue>,
        faults: PanicOnly,
    ) -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                occupied: false,
                next_batch: 0,
                alive: true,
            }),
            changed: Condvar::new(),
            catalog,
            case_queues,
            empty_batch_queue,
            faults,
            on_release: Mutex::new(None),
        }
    }

    /// Runs `hook` whenever the slot frees or the admitter shuts down.
    pub fn on_release(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_release.lock() = Some(Box::new(hook));
    }

    fn released(&self) {
        self.changed.notify_all();
        if let Some(hook) = self.on_release.lock().as_ref() {
            hook();
        }
    }

    /// Claims the admission slot for `submission`, waiting up to `timeout` for it to free.
    pub fn submit(
        &self,
        submission: Submission,
        reply: ReplyRoute,
        timeout: Duration,
    ) -> Result<BatchId, AdmitError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.alive && slot.occupied {
            if self.changed.wait_until(&mut slot, deadline).timed_out() && slot.occupied {
                return Err(if slot.alive {
                    AdmitError::Timeout
                } else {
                    AdmitError::Shutdown
                });
            }
        }
        if !slot.alive {
            return Err(AdmitError::Shutdown);
        }
        Ok(self.claim(slot, submission, reply))
    }

    /// Claims the slot only if it is free right now.
    pub fn try_submit(&self, submission: Submission, reply: ReplyRoute) -> Result<BatchId, TrySubmitError> {
        let slot = self.slot.lock();
        if !slot.alive {
            return Err(TrySubmitError::Shutdown);
        }
        if slot.occupied {
            return Err(TrySubmitError::Busy(submission, reply));
        }
        Ok(self.claim(slot, submission, reply))
    }

    fn claim(&self, mut slot: MutexGuard<'_, Slot>, submission: Submission, reply: ReplyRoute) -> BatchId {
        let batch = BatchId(slot.next_batch);
        slot.next_batch += 1;
        slot.occupied = true;
        slot.pending = Some(Pending {
            batch,
            submission,
            reply,
        });
        drop(slot);
        self.changed.notify_all();
        tracing::info!(batch_id = %batch, "submission admitted");
        batch
    }

    /// Stops the admitter thread and fails every waiting and future `submit`.
    pub fn shutdown(&self) {
        self.slot.lock().alive = false;
        self.released();
    }

    pub fn is_alive(&self) -> bool {
        self.slot.lock().alive
    }

    /// The admitter thread's body.
    pub fn run(&self, barrier: &Barrier) {
        barrier.wait();
        tracing::debug!("admitter started");
        while let Some(pending) = self.next_pending() {
            let batch = pending.batch;
            let outcome = self.process(pending);
            self.release_slot();
            if let Err(fault) = outcome {
                tracing::error!(batch_id = %batch, error = %fault, "resolution failed");
                self.faults.panic(fault);
                break;
            }
        }
        tracing::debug!("admitter exiting");
    }

    fn next_pending(&self) -> Option<Pending> {
        let mut slot = self.slot.lock();
        loop {
            if !slot.alive {
                return None;
            }
            if let Some(pending) = slot.pending.take() {
                return Some(pending);
            }
            self.changed.wait(&mut slot);
        }
    }

    fn release_slot(&self) {
        self.slot.lock().occupied = false;
        self.released();
    }

    fn process(&self, pending: Pending) -> Result<(), Fault> {
        let Pending {
            batch,
            submission,
            reply,
        } = pending;
        let progress = Arc::new(BatchProgress::new(batch));

        let resolved = match self.resolve(&submission, &progress) {
            Ok(resolved) => resolved,
            Err(e) => {
                if let Err(send_err) = reply.send(WireResponse::failure(format!("Failed to resolve suite: {e}"))) {
                    tracing::warn!(batch_id = %batch, error = %send_err, "could not report resolution failure");
                }
                return Err(Fault::new(COMPONENT, e.to_string()));
            }
        };

        let total: usize = resolved.iter().map(|(_, cases)| cases.len()).sum();
        tracing::info!(batch_id = %batch, groups = resolved.len(), cases = total, "batch resolved");

        if total == 0 {
            progress.set_phase(BatchPhase::Aggregating);
            let event = AggregatorEvent::EmptyBatch { progress, reply };
            self.put_with_retry(self.empty_batch_queue.as_ref(), event);
            return Ok(());
        }

        self.distribute(resolved, &progress, &reply);
        Ok(())
    }

    fn resolve(&self, submission: &Submission, progress: &BatchProgress) -> Result<Resolved, ResolveError> {
        progress.set_phase(BatchPhase::Resolving);
        let base_dir = submission.base_dir();
        if !base_dir.exists() {
            return Err(ResolveError::MissingBaseDir(base_dir.to_path_buf()));
        }
        if !base_dir.is_dir() {
            return Err(ResolveError::NotADirectory(base_dir.to_path_buf()));
        }

        let mut resolved = Vec::new();
        for entry in WalkDir::new(base_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !submission.matcher().is_match(&file_name) {
                continue;
            }

            let unit = Unit {
                path: entry.path().to_path_buf(),
                group: group_id(base_dir, entry.path()),
                dependencies: submission.dependencies().to_vec(),
            };
            let cases = self.catalog.discover(&unit)?;
            progress.declare_group(unit.group.clone(), cases.len())?;
            tracing::debug!(batch_id = %progress.id(), group = %unit.group, cases = cases.len(), "group discovered");
            resolved.push((Arc::new(unit), cases));
        }
        progress.seal();
        Ok(resolved)
    }

    /// Strict round-robin from queue 0, one case per queue in turn.
    fn distribute(&self, resolved: Resolved, progress: &Arc<BatchProgress>, reply: &ReplyRoute) {
        progress.set_phase(BatchPhase::Distributing);
        let mut next = 0;
        for (unit, cases) in resolved {
            for name in cases {
                let case = TestCase {
                    unit: Arc::clone(&unit),
                    name,
                    progress: Arc::clone(progress),
                    reply: reply.clone(),
                };
                if !self.put_with_retry(self.case_queues[next].as_ref(), case) {
                    tracing::warn!(batch_id = %progress.id(), "distribution stopped by shutdown");
                    return;
                }
                next = (next + 1) % self.case_queues.len();
            }
        }
        progress.set_phase(BatchPhase::Executing);
    }

    /// Retries timeouts until the item is accepted. Returns false if the queue closed or the admitter shut down.
    fn put_with_retry<T>(&self, queue: &rally_core::BoundedClosableQueue<T>, mut item: T) -> bool {
        loop {
            match queue.put(item, PUT_RETRY) {
                Ok(()) => return true,
                Err(PutError::Closed(_)) => return false,
                Err(PutError::Timeout(back)) => {
                    if !self.is_alive() {
                        return false;
                    }
                    item = back;
                }
            }
        }
    }
}

impl std::fmt::Debug for BatchAdmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("BatchAdmitter")
            .field("alive", &slot.alive)
            .field("occupied", &slot.occupied)
            .field("next_batch", &slot.next_batch)
            .field("queues", &self.case_queues.len())
            .finish()
    }
}

/// `base/a/b/FooTest.class` → `a/b/FooTest.class`. The extension stays: `calc.unit` and `calc.spec` are two groups.
pub fn group_id(base_dir: &Path, unit: &Path) -> GroupId {
    let relative = unit.strip_prefix(base_dir).unwrap_or(unit);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    GroupId::new(parts.join("/"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::RegistryCatalog;
    use crate::server::{Responder, SessionId};
    use rally_core::{BoundedClosableQueue, FaultMonitor, TakeError};
    use std::fs;
    use std::thread;

    struct Rig {
        admitter: Arc<BatchAdmitter>,
        cases: Vec<Arc<CaseQueue>>,
        results: Arc<ResultQueue>,
        monitor: FaultMonitor,
    }

    fn rig(catalog: RegistryCatalog, workers: usize) -> Rig {
        rig_with_capacity(catalog, workers, 64)
    }

    fn rig_with_capacity(catalog: RegistryCatalog, workers: usize, capacity: usize) -> Rig {
        let cases: Vec<_> = (0..workers)
            .map(|_| Arc::new(BoundedClosableQueue::with_capacity(capacity).unwrap()))
            .collect();
        let results = Arc::new(BoundedClosableQueue::with_capacity(64).unwrap());
        let monitor = FaultMonitor::new();
        let admitter = Arc::new(BatchAdmitter::new(
            Arc::new(catalog),
            cases.clone(),
            Arc::clone(&results),
            monitor.panic_only(),
        ));
        Rig {
            admitter,
            cases,
            results,
            monitor,
        }
    }

    fn start(admitter: &Arc<BatchAdmitter>) -> thread::JoinHandle<()> {
        let admitter = Arc::clone(admitter);
        thread::spawn(move || admitter.run(&Barrier::new(1)))
    }

    fn submission(dir: &Path, matcher: &str) -> Submission {
        Submission::new(dir, matcher, None, true).unwrap()
    }

    fn drain(queue: &CaseQueue) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(case) = queue.take(Duration::from_secs(1)) {
            names.push(case.name);
        }
        names
    }

    #[test]
    fn test_group_id_is_the_relative_path() {
        let base = Path::new("/build");
        assert_eq!(group_id(base, Path::new("/build/FooTest.class")).as_str(), "FooTest.class");
        assert_eq!(
            group_id(base, Path::new("/build/a/b/BarTest.class")).as_str(),
            "a/b/BarTest.class"
        );
        assert_ne!(
            group_id(base, Path::new("/build/calc.unit")),
            group_id(base, Path::new("/build/calc.spec"))
        );
        assert_eq!(
            group_id(base, Path::new("/build/deps/ring-0123456789abcdef")).as_str(),
            "deps/ring-0123456789abcdef"
        );
    }

    #[test]
    fn test_cases_distributed_round_robin_from_queue_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ATest.class"), b"").unwrap();
        fs::write(dir.path().join("BTest.class"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let catalog = RegistryCatalog::new()
            .case("ATest.class", "a1", || Ok(()))
            .case("ATest.class", "a2", || Ok(()))
            .case("BTest.class", "b1", || Ok(()))
            .case("BTest.class", "b2", || Ok(()))
            .case("BTest.class", "b3", || Ok(()));
        let rig = rig(catalog, 2);
        let handle = start(&rig.admitter);

        let batch = rig
            .admitter
            .submit(submission(dir.path(), r".*Test\.class"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();
        assert_eq!(batch, BatchId(0));

        assert_eq!(drain(&rig.cases[0]), vec!["a1", "b1", "b3"]);
        assert_eq!(drain(&rig.cases[1]), vec!["a2", "b2"]);
        assert_eq!(rig.results.try_take().unwrap_err(), TakeError::Timeout);

        rig.admitter.shutdown();
        handle.join().unwrap();
        assert!(rig.monitor.listen_only().fault().is_none());
    }

    #[test]
    fn test_zero_case_batch_skips_workers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("EmptyTest.class"), b"").unwrap();
        let rig = rig(RegistryCatalog::new(), 3);
        let handle = start(&rig.admitter);

        rig.admitter
            .submit(submission(dir.path(), r".*Test\.class"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();

        match rig.results.take(Duration::from_secs(5)).unwrap() {
            AggregatorEvent::EmptyBatch { progress, .. } => {
                assert!(progress.is_batch_complete());
                assert_eq!(progress.empty_groups().len(), 1);
            }
            other => panic!("expected EmptyBatch, got {other:?}"),
        }
        for queue in &rig.cases {
            assert!(queue.is_empty());
        }

        rig.admitter.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_missing_base_dir_responds_and_faults() {
        let rig = rig(RegistryCatalog::new(), 1);
        let handle = start(&rig.admitter);
        let responder = Responder::new();

        rig.admitter
            .submit(
                submission(Path::new("/no/such/rally/dir"), ".*"),
                ReplyRoute::session(SessionId(9), responder.clone()),
                Duration::from_secs(1),
            )
            .unwrap();
        handle.join().unwrap();

        let fault = rig.monitor.listen_only().fault().unwrap();
        assert_eq!(fault.component, "admitter");
        let sent = responder.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SessionId(9));
        assert!(!sent[0].1.is_success);
    }

    #[test]
    fn test_second_submission_times_out_while_slot_busy() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(RegistryCatalog::new(), 1);
        // no admitter thread: the first submission holds the slot forever
        rig.admitter
            .submit(submission(dir.path(), ".*"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();
        let started = Instant::now();
        assert_eq!(
            rig.admitter
                .submit(submission(dir.path(), ".*"), ReplyRoute::Detached, Duration::from_millis(50))
                .unwrap_err(),
            AdmitError::Timeout
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_second_submission_admitted_after_first_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(RegistryCatalog::new(), 1);
        let handle = start(&rig.admitter);

        let first = rig
            .admitter
            .submit(submission(dir.path(), ".*"), ReplyRoute::Detached, Duration::from_secs(5))
            .unwrap();
        let second = rig
            .admitter
            .submit(submission(dir.path(), ".*"), ReplyRoute::Detached, Duration::from_secs(5))
            .unwrap();
        assert_eq!((first, second), (BatchId(0), BatchId(1)));

        rig.admitter.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(RegistryCatalog::new(), 1);
        rig.admitter.shutdown();
        assert_eq!(
            rig.admitter
                .submit(submission(dir.path(), ".*"), ReplyRoute::Detached, Duration::from_secs(1))
                .unwrap_err(),
            AdmitError::Shutdown
        );
    }

    #[test]
    fn test_discovery_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("BrokenTest.class"), b"").unwrap();
        let rig = rig(RegistryCatalog::new().reject("BrokenTest.class", "cannot load"), 1);
        let handle = start(&rig.admitter);
        rig.admitter
            .submit(submission(dir.path(), r".*Test\.class"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();
        handle.join().unwrap();
        let fault = rig.monitor.listen_only().fault().unwrap();
        assert!(fault.message.contains("cannot load"));
    }

    #[test]
    fn test_units_differing_only_by_extension_are_separate_groups() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("calc.unit"), b"").unwrap();
        fs::write(dir.path().join("calc.spec"), b"").unwrap();
        let catalog = RegistryCatalog::new()
            .case("calc.unit", "adds", || Ok(()))
            .case("calc.spec", "divides", || Ok(()));
        let rig = rig(catalog, 1);
        let handle = start(&rig.admitter);

        rig.admitter
            .submit(submission(dir.path(), r"calc\.(unit|spec)"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();
        let first = rig.cases[0].take(Duration::from_secs(5)).unwrap();
        let second = rig.cases[0].take(Duration::from_secs(5)).unwrap();
        assert_eq!((first.name.as_str(), second.name.as_str()), ("divides", "adds"));
        assert_eq!(first.progress.empty_groups().len(), 0);

        rig.admitter.shutdown();
        handle.join().unwrap();
        assert!(rig.monitor.listen_only().fault().is_none());
    }

    #[test]
    fn test_try_submit_hands_back_a_busy_submission() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(RegistryCatalog::new(), 1);
        // no admitter thread: the first submission holds the slot
        assert_eq!(
            rig.admitter
                .try_submit(submission(dir.path(), ".*"), ReplyRoute::Detached)
                .unwrap(),
            BatchId(0)
        );
        match rig.admitter.try_submit(submission(dir.path(), "kept"), ReplyRoute::Detached) {
            Err(TrySubmitError::Busy(back, reply)) => {
                assert!(back.matcher().is_match("kept"));
                assert!(reply.is_detached());
            }
            other => panic!("expected Busy, got {other:?}"),
        }

        rig.admitter.shutdown();
        assert!(matches!(
            rig.admitter.try_submit(submission(dir.path(), ".*"), ReplyRoute::Detached),
            Err(TrySubmitError::Shutdown)
        ));
    }

    #[test]
    fn test_release_hook_fires_when_slot_frees() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(RegistryCatalog::new(), 1);
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        rig.admitter.on_release(move || {
            let _ = tx.lock().send(());
        });
        let handle = start(&rig.admitter);

        rig.admitter
            .try_submit(submission(dir.path(), ".*"), ReplyRoute::Detached)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            rig.admitter
                .try_submit(submission(dir.path(), ".*"), ReplyRoute::Detached)
                .unwrap(),
            BatchId(1)
        );

        rig.admitter.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_distribution_outlasts_full_queues() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("BulkTest.class"), b"").unwrap();
        let names: Vec<String> = (0..7).map(|i| format!("case{i}")).collect();
        let catalog = names
            .iter()
            .fold(RegistryCatalog::new(), |catalog, name| catalog.case("BulkTest.class", name, || Ok(())));
        // 7 cases against 2 queues of capacity 1
        let rig = rig_with_capacity(catalog, 2, 1);
        let handle = start(&rig.admitter);

        rig.admitter
            .submit(submission(dir.path(), r".*Test\.class"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();

        let mut taken = Vec::new();
        let mut progress = None;
        while taken.len() < names.len() {
            for queue in &rig.cases {
                if let Ok(case) = queue.take(Duration::from_millis(20)) {
                    progress.get_or_insert_with(|| Arc::clone(&case.progress));
                    taken.push(case.name);
                }
            }
        }
        taken.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(taken, expected, "every case distributed exactly once");
        for queue in &rig.cases {
            assert_eq!(queue.take(Duration::from_millis(50)).unwrap_err(), TakeError::Timeout);
        }
        let progress = progress.unwrap();
        // the phase moves to Executing once the last put lands
        let deadline = Instant::now() + Duration::from_secs(5);
        while progress.phase() != BatchPhase::Executing && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(progress.phase(), BatchPhase::Executing);

        rig.admitter.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_ends_a_blocked_distribution() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("BulkTest.class"), b"").unwrap();
        let catalog = RegistryCatalog::new()
            .case("BulkTest.class", "first", || Ok(()))
            .case("BulkTest.class", "second", || Ok(()))
            .case("BulkTest.class", "third", || Ok(()));
        let rig = rig_with_capacity(catalog, 1, 1);
        let handle = start(&rig.admitter);

        rig.admitter
            .submit(submission(dir.path(), r".*Test\.class"), ReplyRoute::Detached, Duration::from_secs(1))
            .unwrap();
        // nobody takes: the admitter is stuck putting "second"
        let deadline = Instant::now() + Duration::from_secs(5);
        while rig.cases[0].len() < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(50));

        let stopping = Instant::now();
        rig.admitter.shutdown();
        handle.join().unwrap();
        assert!(stopping.elapsed() < PUT_RETRY * 3, "shutdown waited {:?}", stopping.elapsed());
        assert_eq!(rig.cases[0].len(), 1);
        assert!(rig.monitor.listen_only().fault().is_none());
    }
}
