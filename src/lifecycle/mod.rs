//! Startup and shutdown coordination.
//!
//! [`Lifecycle::start`] builds the whole server and returns once every thread has passed the readiness barrier:
//!
//! 1. the 2N pipeline queues;
//! 2. the admitter, then the connection server (bound, program info written);
//! 3. N workers and the aggregator;
//! 4. one named thread per component, each body wrapped so a panic becomes a [`Fault`];
//! 5. a barrier of N + 3 component threads plus the coordinator.
//!
//! [`Lifecycle::wait`] then blocks until the [`FaultMonitor`] reports a cause and tears down in a fixed order: close
//! every queue, stop the server, stop the workers, stop the admitter, stop the aggregator, join everything.
//!
//! ## Notes
//!
//! - A graceful cause ends with `Ok(())`. A fault ends with [`LifecycleError::Fault`] carrying the first fault.
//! - Closing the queues first fails every blocked `put`, so no thread can stay parked behind a full queue.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod program_info;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

use miette::Diagnostic;
use rally_core::{Fault, FaultMonitor, ListenOnly, NotifyOnly, PanicOnly, QueueError, ShutdownCause};
use thiserror::Error;

use crate::catalog::TestCatalog;
use crate::config::{ConfigError, DatabaseConfig, RallyConfig};
use crate::output::{ConsoleSink, ResultSink, SinkError, SqliteSink};
use crate::pipeline::worker::panic_message;
use crate::pipeline::{BatchAdmitter, PipelineQueues, ResultAggregator, RunFlag, Worker};
use crate::server::{ConnectionServer, ServerError, ServerHandle};

pub use program_info::ProgramInfo;

#[derive(Debug, Error, Diagnostic)]
pub enum LifecycleError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build pipeline queues: {0}")]
    #[diagnostic(code(rally::lifecycle::queues))]
    Queues(#[from] QueueError),

    #[error("failed to start the connection server: {0}")]
    #[diagnostic(
        code(rally::lifecycle::server),
        help("widen the port range or raise the bind attempts")
    )]
    Server(#[from] ServerError),

    #[error("failed to open result sink: {0}")]
    #[diagnostic(code(rally::lifecycle::sink))]
    Sink(#[from] SinkError),

    #[error("program info file `{}`: {source}", path.display())]
    #[diagnostic(code(rally::lifecycle::program_info))]
    ProgramInfo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot determine the home directory for the program info file")]
    #[diagnostic(code(rally::lifecycle::no_home), help("set HOME, or configure an explicit info directory"))]
    NoHomeDir,

    #[error("failed to spawn thread `{name}`: {source}")]
    #[diagnostic(code(rally::lifecycle::spawn))]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{component} failed: {message}")]
    #[diagnostic(code(rally::fault))]
    Fault { component: String, message: String },
}

impl From<Fault> for LifecycleError {
    fn from(fault: Fault) -> Self {
        LifecycleError::Fault {
            component: fault.component,
            message: fault.message,
        }
    }
}

/// The sinks a config asks for: the console always, the database when enabled.
pub fn sinks_for(config: &RallyConfig) -> Result<Vec<Box<dyn ResultSink>>, LifecycleError> {
    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(ConsoleSink::stdout())];
    if config.write_to_db {
        let path = config.db_config.as_deref().ok_or(ConfigError::MissingDbConfig)?;
        let db = DatabaseConfig::load(path)?;
        sinks.push(Box::new(SqliteSink::from_config(&db)?));
    }
    Ok(sinks)
}

/// Builds and starts a server with the sinks its config asks for, then serves until it shuts down.
pub fn run(config: RallyConfig, catalog: Arc<dyn TestCatalog>) -> Result<(), LifecycleError> {
    let sinks = sinks_for(&config)?;
    Lifecycle::start(&config, catalog, sinks)?.wait()
}

struct Stoppers {
    queues: PipelineQueues,
    server: ServerHandle,
    workers: RunFlag,
    admitter: Arc<BatchAdmitter>,
    aggregator: RunFlag,
}

/// A started server. Dropping it without [`Lifecycle::wait`] leaves the threads running.
pub struct Lifecycle {
    port: u16,
    monitor: FaultMonitor,
    stoppers: Stoppers,
    threads: Vec<(String, JoinHandle<()>)>,
    info: ProgramInfo,
}

impl Lifecycle {
    pub fn start(
        config: &RallyConfig,
        catalog: Arc<dyn TestCatalog>,
        sinks: Vec<Box<dyn ResultSink>>,
    ) -> Result<Self, LifecycleError> {
        let monitor = FaultMonitor::new();
        let queues = PipelineQueues::new(config.workers, config.queue_capacity)?;

        let admitter = Arc::new(BatchAdmitter::new(
            Arc::clone(&catalog),
            queues.cases.clone(),
            Arc::clone(&queues.results[0]),
            monitor.panic_only(),
        ));
        let server = ConnectionServer::bind(config, Arc::clone(&admitter), monitor.shutdown_only())?;
        let port = server.port();

        let info_dir = match &config.info_dir {
            Some(dir) => dir.clone(),
            None => program_info::default_dir().ok_or(LifecycleError::NoHomeDir)?,
        };
        let info = ProgramInfo::write(&info_dir, std::process::id(), port)?;

        let worker_flag = RunFlag::new();
        let workers: Vec<Worker> = queues
            .cases
            .iter()
            .zip(&queues.results)
            .enumerate()
            .map(|(index, (cases, results))| {
                Worker::new(
                    index,
                    Arc::clone(cases),
                    Arc::clone(results),
                    Arc::clone(&catalog),
                    worker_flag.clone(),
                    monitor.panic_only(),
                )
            })
            .collect();

        let aggregator_flag = RunFlag::new();
        let aggregator = ResultAggregator::new(
            queues.results.clone(),
            sinks,
            config.mode,
            aggregator_flag.clone(),
            monitor.panic_only(),
            monitor.notify_only(),
        );

        let stoppers = Stoppers {
            queues,
            server: server.handle(),
            workers: worker_flag,
            admitter: Arc::clone(&admitter),
            aggregator: aggregator_flag,
        };

        let barrier = Arc::new(Barrier::new(config.workers + 4));
        let faults = monitor.panic_only();
        let mut threads = Vec::with_capacity(config.workers + 3);
        let mut spawn = |name: String, body: Box<dyn FnOnce(&Barrier) + Send>| -> Result<(), LifecycleError> {
            let handle = spawn_component(name.clone(), Arc::clone(&barrier), faults.clone(), body)?;
            threads.push((name, handle));
            Ok(())
        };

        spawn("server".into(), Box::new(move |b: &Barrier| server.run(b)))?;
        let admitter_thread = Arc::clone(&admitter);
        spawn("admitter".into(), Box::new(move |b: &Barrier| admitter_thread.run(b)))?;
        for worker in workers {
            spawn(worker.name(), Box::new(move |b: &Barrier| worker.run(b)))?;
        }
        spawn("aggregator".into(), Box::new(move |b: &Barrier| aggregator.run(b)))?;

        barrier.wait();
        tracing::info!(port, workers = config.workers, mode = ?config.mode, "rally ready");

        Ok(Self {
            port,
            monitor,
            stoppers,
            threads,
            info,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn program_info(&self) -> &ProgramInfo {
        &self.info
    }

    /// A handle for asking the server to stop from elsewhere in the process.
    pub fn shutdown_handle(&self) -> NotifyOnly {
        self.monitor.notify_only()
    }

    pub fn listener(&self) -> ListenOnly {
        self.monitor.listen_only()
    }

    /// Blocks until a shutdown cause arrives, then tears everything down.
    pub fn wait(self) -> Result<(), LifecycleError> {
        let cause = self.monitor.listen_only().wait_for_cause();
        match &cause {
            ShutdownCause::Graceful => tracing::info!("shutting down"),
            ShutdownCause::Fault(fault) => {
                tracing::error!(component = %fault.component, message = %fault.message, "fault, shutting down");
            }
        }

        let Self {
            stoppers, threads, info, ..
        } = self;
        stoppers.queues.close_all();
        stoppers.server.shutdown();
        stoppers.workers.stop();
        stoppers.admitter.shutdown();
        stoppers.aggregator.stop();

        for (name, handle) in threads {
            if handle.join().is_err() {
                tracing::warn!(thread = %name, "thread ended with an uncaught panic");
            }
        }
        drop(info);
        tracing::info!("shutdown complete");

        match cause {
            ShutdownCause::Graceful => Ok(()),
            ShutdownCause::Fault(fault) => Err(fault.into()),
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("port", &self.port)
            .field("threads", &self.threads.len())
            .finish()
    }
}

/// Spawns a named component thread whose panics are reported as faults.
///
/// If spawning fails after other components were started, those stay parked at the barrier. Startup errors end the
/// process, so they are not unwound.
fn spawn_component(
    name: String,
    barrier: Arc<Barrier>,
    faults: PanicOnly,
    body: Box<dyn FnOnce(&Barrier) + Send>,
) -> Result<JoinHandle<()>, LifecycleError> {
    let thread_name = name.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(&barrier))) {
                faults.panic(Fault::new(thread_name, panic_message(payload.as_ref())));
            }
        })
        .map_err(|source| LifecycleError::Spawn { name, source })
}
