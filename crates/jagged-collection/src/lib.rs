#![forbid(unsafe_code)]
//! jagged-collection: lazy, partitioned ragged arrays.
//!
//! A [`Collection`] is a layer graph, the name of its output layer, a
//! typetracer `meta` describing every partition, and per-partition row
//! counts where known. Operations never touch data: each one traces its
//! function on the input metas (recording which source columns it needs),
//! then appends one blockwise layer. [`Collection::compute`] optimizes the
//! graph once, executes it, and concatenates the partitions.
//!
//! Full reductions produce a [`LazyScalar`]; reductions that keep an array
//! produce another collection. Both come back as [`Reduced`].
//!
//! Design notes:
//! - Structural errors (types, alignment, axes) surface while building;
//!   only data-dependent failures wait for `compute`.
//! - Derived collections always extend the unoptimized graph, so optimizing
//!   one collection never invalidates another.

pub mod collection;
pub mod reduction;
pub mod scalar;
pub mod state;

mod ops;

pub use collection::{map_partitions, Collection};
pub use reduction::Reduced;
pub use scalar::LazyScalar;
pub use state::State;

pub use jagged_core::{ColumnSet, DataType, Error, Form, Result, Scalar};
pub use jagged_exec::{Engine, ExecError};
pub use jagged_tracer::{Array, BinaryOp, Reducer, UnaryOp};
