#![forbid(unsafe_code)]
//! jagged-tracer: the ragged array engine and its zero-data twin.
//!
//! An [`Array`] is a form plus either concrete rows or a *typetracer*: no rows
//! at all, only the form, an optional length, and [`Lineage`] pointing back at
//! the source columns it was derived from. Every operation in [`ops`] runs the
//! same form rules for both kinds, so a tracer's result form is by
//! construction the form real data would produce.
//!
//! Design notes:
//! - Tracers never hold values. Asking one for values, a host length, or JSON
//!   fails with `Error::Untraceable`.
//! - Touches are recorded into a shared [`Report`] handle created per source
//!   read; lineage carries the handle, there is no ambient state.
//! - Operations are a closed set ([`Op`]) dispatched through one entry point.

pub mod array;
pub mod lineage;
pub mod ops;
pub mod report;

pub use array::{Array, Content, Datum, TypedScalar};
pub use lineage::Lineage;
pub use ops::{BinaryOp, Op, ReduceAxis, Reducer, UnaryOp};
pub use report::{ColumnKey, KeyKind, Report, ReportSnapshot};
