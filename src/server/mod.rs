//! The connection loop: one thread, one poller, every client socket.
//!
//! Each accepted connection gets a [`Session`] and carries exactly one request. The loop reads until a frame is
//! complete and dispatches it. It then stops reading from that session and flushes the response. The socket closes
//! once the session is done.
//!
//! Interests are oneshot. Every event is followed by a re-arm computed from the session state: readable while the
//! session still accepts a request, writable while output is pending, and nothing while a blocking batch is still
//! running.
//!
//! ## Notes
//!
//! - Key `0` is the listener and key `id + 1` is session `id`.
//! - Responses from pipeline threads arrive through the [`Responder`] mailbox. The loop drains it on every wake.
//! - A `run_suite` never blocks the loop. It is parked on its session and offered to the admitter on every tick
//!   until the slot is free or its admission deadline, measured from arrival, passes. Parked submissions are admitted
//!   in arrival order, and the admitter wakes the loop when the slot frees.
//! - In single-shot mode only the first admitted batch runs; later submissions are refused.
//! - When the loop stops, every session still waiting for admission or for its batch gets a failure response before
//!   the sockets close.
//! - Listener and poller failures are fatal. A failing client socket only drops that client.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod responder;
pub mod session;

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::ops::RangeInclusive;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use polling::{Event, Poller};
use rally_core::{Fault, ShutdownOnly};
use rand::Rng;
use thiserror::Error;

use crate::config::{DeploymentMode, RallyConfig};
use crate::pipeline::{AdmitError, BatchAdmitter, BatchId, RunFlag, TrySubmitError};
use crate::protocol::{ClientRequest, Submission, WireResponse, parse_frame};

pub use responder::{ReplyRoute, Responder};
pub use session::{FRAME_CAPACITY, ReadStatus, Session, SessionId};

const COMPONENT: &str = "server";
const LISTENER_KEY: usize = 0;
/// Upper bound on one poller wait; wake-ups normally come from sockets or [`Poller::notify`].
const WAIT_TIMEOUT: Duration = Duration::from_millis(250);
/// Sent to a single-shot client whose submission arrives after the one batch was admitted.
pub const SINGLE_BATCH_TAKEN: &str = "Server runs a single batch and it has already been admitted";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no free port in {}..={} after {attempts} attempts", .range.start(), .range.end())]
    NoPortAvailable { range: RangeInclusive<u16>, attempts: u32 },

    #[error("connection loop I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Binds a loopback listener on a random port from `range`.
pub fn bind_random(range: &RangeInclusive<u16>, attempts: u32) -> Result<TcpListener, ServerError> {
    let mut rng = rand::rng();
    for attempt in 1..=attempts {
        let port = rng.random_range(range.clone());
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                tracing::debug!(port, attempt, "listener bound");
                return Ok(listener);
            }
            Err(e) => tracing::debug!(port, attempt, error = %e, "port unavailable"),
        }
    }
    Err(ServerError::NoPortAvailable {
        range: range.clone(),
        attempts,
    })
}

struct Parked {
    submission: Submission,
    reply: ReplyRoute,
    deadline: Instant,
}

struct Connection {
    stream: TcpStream,
    session: Session,
    /// A submission waiting for the admission slot.
    parked: Option<Parked>,
    /// An admitted blocking batch whose response has not been delivered yet.
    awaiting: bool,
    /// Closing this session after its response ends the run.
    ends_run: bool,
}

impl Connection {
    /// The session's response will come later, from admission or from the pipeline.
    fn in_flight(&self) -> bool {
        self.awaiting || self.parked.is_some()
    }
}

/// Stops a running [`ConnectionServer`] from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    running: RunFlag,
    poller: Arc<Poller>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        self.running.stop();
        if let Err(e) = self.poller.notify() {
            tracing::warn!(error = %e, "failed to wake connection loop");
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("running", &self.running.is_running())
            .finish()
    }
}

pub struct ConnectionServer {
    listener: TcpListener,
    port: u16,
    poller: Arc<Poller>,
    responder: Responder,
    running: RunFlag,
    admitter: Arc<BatchAdmitter>,
    mode: DeploymentMode,
    admission_timeout: Duration,
    signals: ShutdownOnly,
    connections: HashMap<SessionId, Connection>,
    /// Sessions with a parked submission, oldest first.
    admission_line: VecDeque<SessionId>,
    /// Sessions that went away while their batch was still running.
    orphaned: HashSet<SessionId>,
    /// Single-shot only: the one batch has been admitted.
    batch_admitted: bool,
    next_session: u64,
}

impl ConnectionServer {
    /// Binds the listener and registers it. Nothing is accepted until [`ConnectionServer::run`].
    pub fn bind(
        config: &RallyConfig,
        admitter: Arc<BatchAdmitter>,
        signals: ShutdownOnly,
    ) -> Result<Self, ServerError> {
        let listener = bind_random(&config.port_range, config.bind_attempts)?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let poller = Arc::new(Poller::new()?);
        poller.add(&listener, Event::readable(LISTENER_KEY))?;
        let waker = Arc::clone(&poller);
        admitter.on_release(move || {
            if let Err(e) = waker.notify() {
                tracing::warn!(error = %e, "failed to wake connection loop");
            }
        });
        tracing::info!(port, "listening");

        Ok(Self {
            listener,
            port,
            responder: Responder::with_waker(Arc::clone(&poller)),
            poller,
            running: RunFlag::new(),
            admitter,
            mode: config.mode,
            admission_timeout: config.admission_timeout,
            signals,
            connections: HashMap::new(),
            admission_line: VecDeque::new(),
            orphaned: HashSet::new(),
            batch_admitted: false,
            next_session: 0,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: self.running.clone(),
            poller: Arc::clone(&self.poller),
        }
    }

    /// The connection thread's body.
    pub fn run(mut self, barrier: &Barrier) {
        barrier.wait();
        tracing::debug!(port = self.port, "connection loop started");
        if let Err(e) = self.serve() {
            self.signals.panic(Fault::new(COMPONENT, e.to_string()));
        }
        self.deliver_responses();
        self.fail_in_flight();
        self.flush_remaining();
        for (_, connection) in self.connections.drain() {
            // sockets close on drop regardless
            let _ = self.poller.delete(&connection.stream);
        }
        let _ = self.poller.delete(&self.listener);
        tracing::debug!("connection loop exiting");
    }

    fn serve(&mut self) -> Result<(), ServerError> {
        let mut events = Vec::new();
        while self.running.is_running() {
            events.clear();
            match self.poller.wait(&mut events, Some(WAIT_TIMEOUT)) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in &events {
                if event.key == LISTENER_KEY {
                    self.accept_all()?;
                    continue;
                }
                let id = SessionId((event.key - 1) as u64);
                if event.readable {
                    self.on_readable(id);
                }
                if event.writable {
                    self.on_writable(id);
                }
                self.settle(id);
            }

            self.deliver_responses();
            self.admit_parked();
        }
        Ok(())
    }

    /// Answers every session whose response would otherwise never come.
    fn fail_in_flight(&mut self) {
        let pending: Vec<SessionId> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.in_flight())
            .map(|(id, _)| *id)
            .collect();
        for id in pending {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.parked = None;
                connection.awaiting = false;
            }
            tracing::debug!(session_id = %id, "answering in-flight session before exit");
            self.respond(id, WireResponse::failure(AdmitError::Shutdown.to_string()));
        }
        self.admission_line.clear();
    }

    /// One last nonblocking attempt to deliver responses that were ready when the loop stopped.
    fn flush_remaining(&mut self) {
        for connection in self.connections.values_mut() {
            while connection.session.has_pending_output() {
                match connection.session.write_to(&mut connection.stream) {
                    Ok(true) => {}
                    Ok(false) | Err(_) => break,
                }
            }
        }
    }

    fn accept_all(&mut self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let id = SessionId(self.next_session);
                    self.next_session += 1;
                    if let Err(e) = self.register(id, stream) {
                        tracing::warn!(session_id = %id, error = %e, "failed to register client");
                        continue;
                    }
                    tracing::debug!(session_id = %id, %peer, "client connected");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if matches!(e.kind(), io::ErrorKind::ConnectionAborted | io::ErrorKind::Interrupted) => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.poller.modify(&self.listener, Event::readable(LISTENER_KEY))?;
        Ok(())
    }

    fn register(&mut self, id: SessionId, stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(true)?;
        self.poller.add(&stream, Event::readable(key(id)))?;
        self.connections.insert(
            id,
            Connection {
                stream,
                session: Session::new(id),
                parked: None,
                awaiting: false,
                ends_run: false,
            },
        );
        Ok(())
    }

    fn on_readable(&mut self, id: SessionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        if connection.session.is_terminated() {
            return;
        }

        let status = match connection.session.read_from(&mut connection.stream) {
            Ok(ReadStatus::Eof) => {
                tracing::debug!(session_id = %id, "client closed connection");
                self.close(id);
                return;
            }
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "read failed, dropping client");
                self.close(id);
                return;
            }
        };

        match connection.session.next_request() {
            Some(frame) => self.dispatch(id, &frame),
            None if status == ReadStatus::Full || connection.session.inbound_is_full() => {
                self.respond(id, WireResponse::failure("request exceeds maximum frame size"));
            }
            None => {}
        }
    }

    fn dispatch(&mut self, id: SessionId, frame: &[u8]) {
        let request = match parse_frame(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "malformed request");
                self.respond(id, WireResponse::failure(e.client_message()));
                return;
            }
        };

        match request {
            ClientRequest::Shutdown => {
                tracing::info!(session_id = %id, "shutdown requested by client");
                self.respond(id, WireResponse::ack());
                if let Some(connection) = self.connections.get_mut(&id) {
                    connection.ends_run = true;
                }
            }
            ClientRequest::RunSuite(submission) => {
                if self.batch_admitted {
                    tracing::warn!(session_id = %id, "submission refused, the single batch is taken");
                    self.respond(id, WireResponse::failure(SINGLE_BATCH_TAKEN));
                    return;
                }
                let reply = if submission.is_blocking() {
                    ReplyRoute::session(id, self.responder.clone())
                } else {
                    ReplyRoute::Detached
                };
                let Some(connection) = self.connections.get_mut(&id) else {
                    return;
                };
                connection.session.terminate();
                connection.parked = Some(Parked {
                    submission,
                    reply,
                    deadline: Instant::now() + self.admission_timeout,
                });
                self.admission_line.push_back(id);
                tracing::debug!(session_id = %id, "submission parked for admission");
            }
        }
    }

    /// Offers parked submissions to the admitter in arrival order, then expires the ones past their deadline.
    fn admit_parked(&mut self) {
        while let Some(&id) = self.admission_line.front() {
            let Some(parked) = self.connections.get_mut(&id).and_then(|c| c.parked.take()) else {
                // the client left while waiting
                self.admission_line.pop_front();
                continue;
            };
            if self.batch_admitted {
                self.admission_line.pop_front();
                self.respond(id, WireResponse::failure(SINGLE_BATCH_TAKEN));
                self.settle(id);
                continue;
            }

            let blocking = !parked.reply.is_detached();
            match self.admitter.try_submit(parked.submission, parked.reply) {
                Ok(batch) => {
                    self.admission_line.pop_front();
                    self.admitted(id, batch, blocking);
                }
                Err(TrySubmitError::Busy(submission, reply)) => {
                    if let Some(connection) = self.connections.get_mut(&id) {
                        connection.parked = Some(Parked {
                            submission,
                            reply,
                            deadline: parked.deadline,
                        });
                    }
                    break;
                }
                Err(TrySubmitError::Shutdown) => {
                    self.admission_line.pop_front();
                    self.reject(id, AdmitError::Shutdown);
                }
            }
        }

        let now = Instant::now();
        let expired: Vec<SessionId> = self
            .admission_line
            .iter()
            .copied()
            .filter(|id| {
                self.connections
                    .get(id)
                    .and_then(|c| c.parked.as_ref())
                    .is_some_and(|parked| parked.deadline <= now)
            })
            .collect();
        if expired.is_empty() {
            return;
        }
        self.admission_line.retain(|id| !expired.contains(id));
        for id in expired {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.parked = None;
            }
            self.reject(id, AdmitError::Timeout);
        }
    }

    fn admitted(&mut self, id: SessionId, batch: BatchId, blocking: bool) {
        if self.mode == DeploymentMode::SingleShot {
            self.batch_admitted = true;
        }
        if !blocking {
            self.respond(id, WireResponse::suite(batch));
            self.settle(id);
            return;
        }
        tracing::debug!(session_id = %id, batch_id = %batch, "awaiting batch completion");
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.awaiting = true;
            connection.ends_run = self.mode == DeploymentMode::SingleShot;
        }
    }

    fn reject(&mut self, id: SessionId, error: AdmitError) {
        tracing::warn!(session_id = %id, error = %error, "submission rejected");
        self.respond(id, WireResponse::failure(error.to_string()));
        self.settle(id);
    }

    /// Queues the session's one response and stops reading from it.
    fn respond(&mut self, id: SessionId, response: WireResponse) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        connection.session.terminate();
        if let Err(e) = connection.session.queue_response(&response.encode()) {
            tracing::warn!(session_id = %id, error = %e, "response does not fit the session buffer");
            self.close(id);
        }
    }

    fn on_writable(&mut self, id: SessionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        if let Err(e) = connection.session.write_to(&mut connection.stream) {
            tracing::debug!(session_id = %id, error = %e, "write failed, dropping client");
            self.close(id);
        }
    }

    fn deliver_responses(&mut self) {
        for (id, response) in self.responder.drain() {
            match self.connections.get_mut(&id) {
                Some(connection) => {
                    connection.awaiting = false;
                    self.respond(id, response);
                    self.settle(id);
                }
                None => {
                    if self.orphaned.remove(&id) && self.mode == DeploymentMode::SingleShot {
                        tracing::info!(session_id = %id, "batch finished after its client left");
                        self.signals.request_graceful_shutdown();
                    }
                }
            }
        }
    }

    /// Re-arms the session's interests, or closes it when there is nothing left to do.
    fn settle(&mut self, id: SessionId) {
        let Some(connection) = self.connections.get(&id) else {
            return;
        };
        if connection.session.is_done() && !connection.in_flight() {
            self.close(id);
            return;
        }
        let interest = Event {
            key: key(id),
            readable: !connection.session.is_terminated(),
            writable: connection.session.has_pending_output(),
        };
        if let Err(e) = self.poller.modify(&connection.stream, interest) {
            tracing::warn!(session_id = %id, error = %e, "failed to re-arm client");
            self.close(id);
        }
    }

    fn close(&mut self, id: SessionId) {
        let Some(connection) = self.connections.remove(&id) else {
            return;
        };
        let _ = self.poller.delete(&connection.stream);
        if connection.awaiting {
            self.orphaned.insert(id);
        } else if connection.ends_run {
            tracing::info!(session_id = %id, "run finished");
            self.signals.request_graceful_shutdown();
        }
        tracing::debug!(session_id = %id, "session closed");
    }
}

fn key(id: SessionId) -> usize {
    id.0 as usize + 1
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::RegistryCatalog;
    use crate::pipeline::PipelineQueues;
    use rally_core::{FaultMonitor, ShutdownCause};
    use std::io::{BufRead, BufReader, Write};
    use std::thread;

    /// A server whose admitter has no thread: an admitted batch holds the slot until shutdown.
    fn server_with_admitter(config: &RallyConfig, monitor: &FaultMonitor) -> (ConnectionServer, Arc<BatchAdmitter>) {
        let queues = PipelineQueues::new(1, 8).unwrap();
        let admitter = Arc::new(BatchAdmitter::new(
            Arc::new(RegistryCatalog::new()),
            queues.cases.clone(),
            Arc::clone(&queues.results[0]),
            monitor.panic_only(),
        ));
        let server = ConnectionServer::bind(config, Arc::clone(&admitter), monitor.shutdown_only()).unwrap();
        (server, admitter)
    }

    fn server(config: &RallyConfig, monitor: &FaultMonitor) -> ConnectionServer {
        server_with_admitter(config, monitor).0
    }

    fn run_suite(blocking: bool) -> Vec<u8> {
        let body = format!("{{\"base_dir\":\"/srv/units\",\"is_blocking\":{blocking}}}");
        format!("{{\"request_type\":\"run_suite\",\"body\":{body}}}\n").into_bytes()
    }

    fn decode(line: &str) -> WireResponse {
        WireResponse::decode(line.trim_end()).unwrap()
    }

    fn exchange(port: u16, request: &[u8]) -> String {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        stream.write_all(request).unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_no_port_available() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = bind_random(&(port..=port), 3).unwrap_err();
        assert!(matches!(err, ServerError::NoPortAvailable { attempts: 3, .. }));
    }

    #[test]
    fn test_malformed_request_does_not_end_single_shot_run() {
        let config = RallyConfig::builder().build().unwrap();
        let monitor = FaultMonitor::new();
        let server = server(&config, &monitor);
        let (port, handle) = (server.port(), server.handle());
        let thread = thread::spawn(move || server.run(&Barrier::new(1)));

        let line = exchange(port, b"{not json}\n");
        let response = WireResponse::decode(line.trim_end()).unwrap();
        assert!(!response.is_success);
        assert!(response.error.unwrap().starts_with("Failed to parse request: "));

        assert!(monitor.listen_only().wait_for_cause_timeout(Duration::from_millis(200)).is_none());
        handle.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_shutdown_request_is_acknowledged_then_signalled() {
        let config = RallyConfig::builder().mode(DeploymentMode::LongLived).build().unwrap();
        let monitor = FaultMonitor::new();
        let server = server(&config, &monitor);
        let (port, handle) = (server.port(), server.handle());
        let thread = thread::spawn(move || server.run(&Barrier::new(1)));

        let line = exchange(port, b"{\"request_type\":\"shutdown\"}\n");
        assert_eq!(WireResponse::decode(line.trim_end()).unwrap(), WireResponse::ack());
        assert_eq!(
            monitor.listen_only().wait_for_cause_timeout(Duration::from_secs(5)),
            Some(ShutdownCause::Graceful)
        );
        handle.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let config = RallyConfig::builder().mode(DeploymentMode::LongLived).build().unwrap();
        let monitor = FaultMonitor::new();
        let server = server(&config, &monitor);
        let (port, handle) = (server.port(), server.handle());
        let thread = thread::spawn(move || server.run(&Barrier::new(1)));

        let line = exchange(port, &vec![b'x'; FRAME_CAPACITY]);
        let response = WireResponse::decode(line.trim_end()).unwrap();
        assert_eq!(response.error.as_deref(), Some("request exceeds maximum frame size"));

        handle.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_waiting_for_the_slot_does_not_stall_other_clients() {
        let config = RallyConfig::builder()
            .mode(DeploymentMode::LongLived)
            .admission_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let monitor = FaultMonitor::new();
        let (server, admitter) = server_with_admitter(&config, &monitor);
        // occupy the slot for the whole test
        admitter
            .try_submit(
                Submission::new("/srv/units", ".*", None, false).unwrap(),
                ReplyRoute::Detached,
            )
            .unwrap();
        let (port, handle) = (server.port(), server.handle());
        let thread = thread::spawn(move || server.run(&Barrier::new(1)));

        let submitted = Instant::now();
        let waiting = thread::spawn(move || exchange(port, &run_suite(false)));
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        let line = exchange(port, b"{not json}\n");
        assert!(!decode(&line).is_success);
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());

        let timed_out = decode(&waiting.join().unwrap());
        assert_eq!(timed_out.error, Some(AdmitError::Timeout.to_string()));
        assert!(submitted.elapsed() >= Duration::from_secs(2));

        handle.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_parked_submission_is_admitted_when_the_slot_frees() {
        let config = RallyConfig::builder()
            .mode(DeploymentMode::LongLived)
            .admission_timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        let monitor = FaultMonitor::new();
        let (server, admitter) = server_with_admitter(&config, &monitor);
        admitter
            .try_submit(
                Submission::new("/no/such/rally/dir", ".*", None, false).unwrap(),
                ReplyRoute::Detached,
            )
            .unwrap();
        let (port, handle) = (server.port(), server.handle());
        let thread = thread::spawn(move || server.run(&Barrier::new(1)));

        let waiting = thread::spawn(move || exchange(port, &run_suite(false)));
        thread::sleep(Duration::from_millis(300));
        // resolving batch 0 fails and frees the slot; batch 1 is admitted behind it
        let worker = Arc::clone(&admitter);
        let admitter_thread = thread::spawn(move || worker.run(&Barrier::new(1)));

        assert_eq!(decode(&waiting.join().unwrap()), WireResponse::suite(BatchId(1)));
        admitter_thread.join().unwrap();

        handle.shutdown();
        thread.join().unwrap();
    }

    #[test]
    fn test_single_shot_refuses_a_second_batch_and_answers_the_first_on_exit() {
        let config = RallyConfig::builder().build().unwrap();
        let monitor = FaultMonitor::new();
        let server = server(&config, &monitor);
        let (port, handle) = (server.port(), server.handle());
        let thread = thread::spawn(move || server.run(&Barrier::new(1)));

        let first = thread::spawn(move || exchange(port, &run_suite(true)));
        thread::sleep(Duration::from_millis(300));

        let second = decode(&exchange(port, &run_suite(true)));
        assert_eq!(second.error.as_deref(), Some(SINGLE_BATCH_TAKEN));

        handle.shutdown();
        thread.join().unwrap();
        let first = decode(&first.join().unwrap());
        assert_eq!(first.error, Some(AdmitError::Shutdown.to_string()));
    }
}
