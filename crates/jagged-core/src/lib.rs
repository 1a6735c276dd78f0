#![forbid(unsafe_code)]
//! jagged-core: shared vocabulary for the jagged runtime.
//!
//! Structural types (`Form`), row values (`Value`/`Scalar`), identifiers for
//! graph layers and tasks, engine configuration, and stable hashing. Every
//! other crate in the workspace builds on these.
//!
//! Design notes:
//! - Core does no I/O and owns no threads.
//! - Forms and values are serde types so graphs and configs can be
//!   fingerprinted and logged.

pub mod config;
pub mod error;
pub mod form;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod types;

pub use config::{EngineConfig, OnFail, OptimizationConfig, OptimizationPass};
pub use error::{Error, Result};
pub use form::{ColumnSet, DataType, Field, Form};
pub use hash::Hash256;
pub use id::{LayerName, NodeKey};
pub use types::{Scalar, Value};

/// Crate version for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
