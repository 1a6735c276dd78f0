//! Materialized tasks: what a scheduler actually runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use jagged_core::{ColumnSet, Error, NodeKey, Result};
use jagged_tracer::ops::{combine, partial};
use jagged_tracer::{Datum, ReduceAxis, Reducer};

use crate::func::PartitionFn;
use crate::source::Source;

#[derive(Debug, Clone)]
pub enum TaskFn {
    Read {
        source: Arc<dyn Source>,
        index: usize,
        columns: Option<ColumnSet>,
    },
    Apply(PartitionFn),
    Partial {
        reducer: Reducer,
        axis: ReduceAxis,
    },
    Combine {
        reducer: Reducer,
    },
}

impl TaskFn {
    pub fn label(&self) -> String {
        match self {
            TaskFn::Read { source, .. } => format!("read:{}", source.label()),
            TaskFn::Apply(f) => f.label().to_string(),
            TaskFn::Partial { reducer, .. } => format!("partial:{}", reducer.name()),
            TaskFn::Combine { reducer } => format!("combine:{}", reducer.name()),
        }
    }
}

/// A callable plus the keys whose results are its arguments.
#[derive(Debug, Clone)]
pub struct Task {
    pub func: TaskFn,
    pub args: Vec<NodeKey>,
}

impl Task {
    /// Run with `inputs` in the same order as `args`.
    pub fn run(&self, inputs: &[Datum]) -> Result<Datum> {
        if inputs.len() != self.args.len() {
            return Err(Error::Invariant(format!(
                "task {} expected {} inputs, got {}",
                self.func.label(),
                self.args.len(),
                inputs.len()
            )));
        }
        match &self.func {
            TaskFn::Read {
                source,
                index,
                columns,
            } => source
                .read_partition(*index, columns.as_ref())
                .map(Datum::Array),
            TaskFn::Apply(f) => f.call(inputs),
            TaskFn::Partial { reducer, axis } => partial(&inputs[0], *reducer, *axis),
            TaskFn::Combine { reducer } => combine(inputs, *reducer),
        }
    }
}

/// Flat `key -> task` mapping handed to schedulers.
pub type TaskGraph = BTreeMap<NodeKey, Task>;
