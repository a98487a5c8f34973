#![forbid(unsafe_code)]
//! rally: a single-node test batch execution server
//!
//! A client submits a batch ("run every test unit under this directory"). The server resolves it into test cases,
//! fans them out across a fixed pool of worker threads, captures each case's outcome and output, aggregates
//! completion per group and per batch, and answers the client when the batch is done.
//!
//! ## Layout
//!
//! - [`server`]: the single-threaded connection loop and per-connection framing
//! - [`pipeline`]: admission, workers and aggregation, joined by bounded closable queues
//! - [`catalog`]: how units turn into runnable cases
//! - [`output`]: where results go (console, SQLite)
//! - [`lifecycle`]: startup barrier, fault propagation and ordered teardown
//!
//! The dependency-light primitives (ring buffer, queue, fault monitor) live in the `rally_core` crate.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli`, `server`,
//!   `pipeline` and `lifecycle` modules enforce `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Component threads**: a panic that escapes a component thread is caught by [`lifecycle`] and turned into a
//!   fault, which shuts the server down.

pub mod capture;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod protocol;
pub mod server;

pub use config::{DeploymentMode, RallyConfig};
pub use lifecycle::{Lifecycle, LifecycleError};
