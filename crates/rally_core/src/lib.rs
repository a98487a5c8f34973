//! Shared concurrency primitives for the rally test server.
//!
//! This crate is intentionally small and dependency-light. It holds the pieces every pipeline stage leans on and
//! that carry no knowledge of sockets, test catalogs or persistence:
//!
//! - [`ring`]: fixed-capacity circular byte store with delimiter-seeking reads and rollback.
//! - [`queue`]: bounded, closable, thread-safe queue. It is the only transport between pipeline stages.
//! - [`fault`]: one shared shutdown signal with narrow capability views handed out by role.
//!
//! ## Notes
//!
//! - No IO and no global state. Everything here is owned by whoever constructs it.
//! - Every blocking call takes an explicit timeout and has a defined "gave up" result.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod fault;
pub mod queue;
pub mod ring;

pub use fault::{Fault, FaultMonitor, ListenOnly, NotifyOnly, PanicOnly, ShutdownCause, ShutdownOnly};
pub use queue::{BoundedClosableQueue, PutError, QueueError, TakeError};
pub use ring::{RingBuffer, RingError};
