#![forbid(unsafe_code)]
//! jagged-graph: the lazy operation graph.
//!
//! A [`Graph`] is an arena of [`Layer`]s keyed by unique name. Each layer
//! expands to one task per partition (plus helper tasks for tree
//! reductions); [`Graph::tasks`] materializes the flat
//! `node key -> (callable, argument keys)` mapping a scheduler executes.
//!
//! Design notes:
//! - Layers are immutable and shared through `Arc`; rewrites build a new
//!   graph and leave every graph that referenced the old layer intact.
//! - Sources are collaborators behind the [`Source`] trait: the graph only
//!   knows their form, partitioning, and how to ask for a narrower read.

pub mod func;
pub mod graph;
pub mod layer;
pub mod source;
pub mod task;

pub use func::PartitionFn;
pub use graph::{Graph, GraphSummary, LayerSummary};
pub use layer::{BlockwiseLayer, InputLayer, Layer, LayerArg, LayerKind, ReductionLayer};
pub use source::Source;
pub use task::{Task, TaskFn, TaskGraph};
