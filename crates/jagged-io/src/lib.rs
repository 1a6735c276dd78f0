#![forbid(unsafe_code)]
//! jagged-io: concrete [`Source`](jagged_graph::Source) implementations.
//!
//! - [`MemorySource`]: partitions held in memory; projectable; logs every
//!   read so tests can assert what was fetched.
//! - [`JsonLinesSource`]: one newline-delimited JSON file per partition.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonLinesSource;
pub use memory::{MemorySource, ReadRecord};
