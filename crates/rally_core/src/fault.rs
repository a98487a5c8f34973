//! One shared "everything must stop" signal, handed out through narrow views.
//!
//! A [`FaultMonitor`] owns the signal. Components never receive the monitor itself; they get the one view their role
//! needs:
//!
//! | View | Can do | Given to |
//! |---|---|---|
//! | [`PanicOnly`] | raise a fault | pipeline threads, connection loop |
//! | [`NotifyOnly`] | request graceful shutdown | connection loop (single-shot completion) |
//! | [`ListenOnly`] | wait for either | lifecycle coordinator |
//! | [`ShutdownOnly`] | raise or request | CLI-level code that both fails and finishes |
//!
//! ## Notes
//!
//! - The first fault wins. Later faults are logged and dropped.
//! - Nothing here can fail or panic. This is the channel other threads' failures travel through.
//! - When both a fault and a graceful request are present, listeners see the fault.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// An unrecoverable error captured from some component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Name of the component that raised it, e.g. `worker-3` or `admitter`.
    pub component: String,
    pub message: String,
}

impl Fault {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.component, self.message)
    }
}

impl std::error::Error for Fault {}

/// Why the process is being asked to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    Fault(Fault),
    Graceful,
}

#[derive(Default)]
struct Signal {
    fault: Option<Fault>,
    graceful: bool,
}

impl Signal {
    fn cause(&self) -> Option<ShutdownCause> {
        match (&self.fault, self.graceful) {
            (Some(fault), _) => Some(ShutdownCause::Fault(fault.clone())),
            (None, true) => Some(ShutdownCause::Graceful),
            (None, false) => None,
        }
    }
}

#[derive(Default)]
struct Shared {
    signal: Mutex<Signal>,
    changed: Condvar,
}

impl Shared {
    fn panic(&self, fault: Fault) {
        let mut signal = self.signal.lock();
        if let Some(first) = &signal.fault {
            tracing::warn!(first = %first, ignored = %fault, "fault already raised, ignoring later fault");
            return;
        }
        tracing::error!(component = %fault.component, message = %fault.message, "fault raised");
        signal.fault = Some(fault);
        drop(signal);
        self.changed.notify_all();
    }

    fn request_graceful_shutdown(&self) {
        let mut signal = self.signal.lock();
        if signal.graceful {
            return;
        }
        tracing::debug!("graceful shutdown requested");
        signal.graceful = true;
        drop(signal);
        self.changed.notify_all();
    }
}

/// Owner of the shutdown signal. Hands out capability views.
#[derive(Clone, Default)]
pub struct FaultMonitor {
    shared: Arc<Shared>,
}

impl FaultMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panic_only(&self) -> PanicOnly {
        PanicOnly {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn notify_only(&self) -> NotifyOnly {
        NotifyOnly {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn listen_only(&self) -> ListenOnly {
        ListenOnly {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn shutdown_only(&self) -> ShutdownOnly {
        ShutdownOnly {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for FaultMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signal = self.shared.signal.lock();
        f.debug_struct("FaultMonitor")
            .field("fault", &signal.fault)
            .field("graceful", &signal.graceful)
            .finish()
    }
}

/// Can only raise a fault.
#[derive(Clone)]
pub struct PanicOnly {
    shared: Arc<Shared>,
}

impl PanicOnly {
    pub fn panic(&self, fault: Fault) {
        self.shared.panic(fault);
    }
}

/// Can only request a graceful shutdown.
#[derive(Clone)]
pub struct NotifyOnly {
    shared: Arc<Shared>,
}

impl NotifyOnly {
    pub fn request_graceful_shutdown(&self) {
        self.shared.request_graceful_shutdown();
    }
}

/// Can only observe the signal.
#[derive(Clone)]
pub struct ListenOnly {
    shared: Arc<Shared>,
}

impl ListenOnly {
    /// Blocks until a fault is raised or a graceful shutdown is requested.
    pub fn wait_for_cause(&self) -> ShutdownCause {
        let mut signal = self.shared.signal.lock();
        loop {
            if let Some(cause) = signal.cause() {
                return cause;
            }
            self.shared.changed.wait(&mut signal);
        }
    }

    /// Like [`ListenOnly::wait_for_cause`], giving up after `timeout`.
    pub fn wait_for_cause_timeout(&self, timeout: Duration) -> Option<ShutdownCause> {
        let deadline = Instant::now() + timeout;
        let mut signal = self.shared.signal.lock();
        loop {
            if let Some(cause) = signal.cause() {
                return Some(cause);
            }
            if self.shared.changed.wait_until(&mut signal, deadline).timed_out() {
                return signal.cause();
            }
        }
    }

    /// The captured fault, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.shared.signal.lock().fault.clone()
    }
}

/// Can raise a fault or request a graceful shutdown.
#[derive(Clone)]
pub struct ShutdownOnly {
    shared: Arc<Shared>,
}

impl ShutdownOnly {
    pub fn panic(&self, fault: Fault) {
        self.shared.panic(fault);
    }

    pub fn request_graceful_shutdown(&self) {
        self.shared.request_graceful_shutdown();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nothing_raised_times_out() {
        let monitor = FaultMonitor::new();
        let listener = monitor.listen_only();
        assert_eq!(listener.wait_for_cause_timeout(Duration::from_millis(10)), None);
        assert_eq!(listener.fault(), None);
    }

    #[test]
    fn first_fault_wins() {
        let monitor = FaultMonitor::new();
        let panicker = monitor.panic_only();
        panicker.panic(Fault::new("worker-0", "boom"));
        panicker.panic(Fault::new("worker-1", "second"));

        let cause = monitor.listen_only().wait_for_cause();
        assert_eq!(cause, ShutdownCause::Fault(Fault::new("worker-0", "boom")));
    }

    #[test]
    fn graceful_request_is_observed() {
        let monitor = FaultMonitor::new();
        monitor.notify_only().request_graceful_shutdown();
        assert_eq!(monitor.listen_only().wait_for_cause(), ShutdownCause::Graceful);
    }

    #[test]
    fn fault_takes_priority_over_graceful() {
        let monitor = FaultMonitor::new();
        let both = monitor.shutdown_only();
        both.request_graceful_shutdown();
        both.panic(Fault::new("admitter", "base directory vanished"));
        assert!(matches!(
            monitor.listen_only().wait_for_cause(),
            ShutdownCause::Fault(_)
        ));
    }

    #[test]
    fn fault_display_names_component() {
        assert_eq!(Fault::new("aggregator", "sink failed").to_string(), "aggregator: sink failed");
    }
}
