//! Convenient re-exports for downstream crates.

pub use crate::config::{EngineConfig, OnFail, OptimizationConfig, OptimizationPass};
pub use crate::error::{Error, Result};
pub use crate::form::{ColumnSet, DataType, Field, Form};
pub use crate::hash::Hash256;
pub use crate::id::{LayerName, NodeKey};
pub use crate::types::{Scalar, Value};
