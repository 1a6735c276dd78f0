//! The source collaborator interface.

use std::fmt;

use jagged_core::{ColumnSet, Form, Result};
use jagged_tracer::Array;

/// A partitioned dataset the graph can read from.
///
/// Invariants:
/// - `read_partition` returns rows in a stable order, and the same number of
///   rows whatever `columns` is.
/// - With `columns = Some(set)`, the returned form is `form().project(set)`
///   (or a superset the source chose in `project`).
pub trait Source: Send + Sync + fmt::Debug {
    /// Short, stable label used in layer names, logs and fingerprints.
    fn label(&self) -> &str;

    /// Declared form of one row, unprojected.
    fn form(&self) -> &Form;

    fn npartitions(&self) -> usize;

    /// Row counts per partition where known without reading.
    fn partition_sizes(&self) -> Vec<Option<usize>> {
        vec![None; self.npartitions()]
    }

    /// Read one partition, restricted to `columns` when given.
    fn read_partition(&self, index: usize, columns: Option<&ColumnSet>) -> Result<Array>;

    /// The columns a restricted read would fetch, or `None` when this source
    /// cannot restrict its reads. Sources may widen the set (e.g. to whole
    /// column groups) but never narrow it.
    fn project(&self, columns: &ColumnSet) -> Result<Option<ColumnSet>> {
        let _ = columns;
        Ok(None)
    }
}
