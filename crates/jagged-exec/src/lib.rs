#![forbid(unsafe_code)]
//! jagged-exec: turn an optimized layer graph into results.
//!
//! - [`Scheduler`]: evaluates a materialized task graph for a set of output
//!   keys. [`SyncScheduler`] runs tasks one by one in dependency order;
//!   `AsyncScheduler` (feature `async-scheduler`) runs independent tasks
//!   concurrently on a tokio pool.
//! - [`Engine`]: owns the configuration and a scheduler, runs the optimizer,
//!   executes, and checks every output partition against its layer's meta.
//!
//! Every task runs at most once per `execute` call; intermediate results are
//! dropped as soon as their last consumer has run.

pub mod error;
pub mod metrics;
pub mod runtime;
pub mod scheduler;

pub use error::ExecError;
pub use runtime::{assemble, Engine};
#[cfg(feature = "async-scheduler")]
pub use scheduler::AsyncScheduler;
pub use scheduler::{Scheduler, SyncScheduler};
