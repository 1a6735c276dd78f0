//! Graph layers: one logical operation over every partition.

use std::sync::Arc;

use jagged_core::{ColumnSet, Error, LayerName, NodeKey, Result};
use jagged_tracer::{Datum, ReduceAxis, Reducer, Report};

use crate::func::PartitionFn;
use crate::source::Source;
use crate::task::{Task, TaskFn};

/// Reads every partition of a source.
#[derive(Debug, Clone)]
pub struct InputLayer {
    /// Always the unprojected source; projection is expressed by `columns`.
    pub source: Arc<dyn Source>,
    /// `None` reads everything.
    pub columns: Option<ColumnSet>,
    /// Shared with every tracer built on this layer's meta.
    pub report: Report,
}

/// How a blockwise layer consumes one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerArg {
    /// Partition `i` feeds task `i`.
    Partitioned(LayerName),
    /// The single output of a one-partition layer feeds every task.
    Broadcast(LayerName),
}

impl LayerArg {
    pub fn layer(&self) -> &LayerName {
        match self {
            LayerArg::Partitioned(n) | LayerArg::Broadcast(n) => n,
        }
    }

    fn key(&self, index: usize) -> NodeKey {
        match self {
            LayerArg::Partitioned(n) => n.key(index),
            LayerArg::Broadcast(n) => n.key(0),
        }
    }
}

/// Applies one function partition by partition.
#[derive(Debug, Clone)]
pub struct BlockwiseLayer {
    pub func: PartitionFn,
    pub args: Vec<LayerArg>,
}

/// Folds every partition of `input` into one output through a bounded
/// fan-in tree: per-partition partials, then rounds of combines that merge
/// at most `split_every` results each.
#[derive(Debug, Clone)]
pub struct ReductionLayer {
    pub input: LayerName,
    pub input_partitions: usize,
    pub reducer: Reducer,
    pub axis: ReduceAxis,
    pub split_every: usize,
}

impl ReductionLayer {
    fn partial_group(name: &LayerName) -> String {
        format!("{name}~partial")
    }

    fn combine_group(name: &LayerName, depth: usize) -> String {
        format!("{name}~combine-{depth}")
    }

    fn tasks(&self, name: &LayerName) -> Result<Vec<(NodeKey, Task)>> {
        if self.split_every < 2 {
            return Err(Error::Config(format!(
                "split_every must be at least 2, got {}",
                self.split_every
            )));
        }
        if self.input_partitions == 0 {
            return Err(Error::Invariant(format!(
                "reduction `{name}` over zero partitions"
            )));
        }

        let mut out = Vec::new();
        let partial = Self::partial_group(name);
        let mut level: Vec<NodeKey> = (0..self.input_partitions)
            .map(|i| {
                let key = NodeKey::new(partial.clone(), i);
                out.push((
                    key.clone(),
                    Task {
                        func: TaskFn::Partial {
                            reducer: self.reducer,
                            axis: self.axis,
                        },
                        args: vec![self.input.key(i)],
                    },
                ));
                key
            })
            .collect();

        let mut depth = 0;
        while level.len() > self.split_every {
            let group = Self::combine_group(name, depth);
            level = level
                .chunks(self.split_every)
                .enumerate()
                .map(|(i, chunk)| {
                    let key = NodeKey::new(group.clone(), i);
                    out.push((
                        key.clone(),
                        Task {
                            func: TaskFn::Combine {
                                reducer: self.reducer,
                            },
                            args: chunk.to_vec(),
                        },
                    ));
                    key
                })
                .collect();
            depth += 1;
        }

        out.push((
            name.key(0),
            Task {
                func: TaskFn::Combine {
                    reducer: self.reducer,
                },
                args: level,
            },
        ));
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub enum LayerKind {
    Input(InputLayer),
    Blockwise(BlockwiseLayer),
    Reduction(ReductionLayer),
}

/// One node of the layer graph.
///
/// `meta` is the tracer (or typed scalar) describing each output partition;
/// every output partition must share its form.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: LayerName,
    pub npartitions: usize,
    pub meta: Datum,
    pub kind: LayerKind,
}

impl Layer {
    pub fn input(name: LayerName, source: Arc<dyn Source>, report: Report, meta: Datum) -> Self {
        let npartitions = source.npartitions();
        Self {
            name,
            npartitions,
            meta,
            kind: LayerKind::Input(InputLayer {
                source,
                columns: None,
                report,
            }),
        }
    }

    pub fn blockwise(
        name: LayerName,
        func: PartitionFn,
        args: Vec<LayerArg>,
        npartitions: usize,
        meta: Datum,
    ) -> Self {
        Self {
            name,
            npartitions,
            meta,
            kind: LayerKind::Blockwise(BlockwiseLayer { func, args }),
        }
    }

    pub fn reduction(name: LayerName, reduction: ReductionLayer, meta: Datum) -> Self {
        Self {
            name,
            npartitions: 1,
            meta,
            kind: LayerKind::Reduction(reduction),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            LayerKind::Input(_) => "input",
            LayerKind::Blockwise(_) => "blockwise",
            LayerKind::Reduction(_) => "reduction",
        }
    }

    pub fn is_blockwise(&self) -> bool {
        matches!(self.kind, LayerKind::Blockwise(_))
    }

    pub fn as_input(&self) -> Option<&InputLayer> {
        match &self.kind {
            LayerKind::Input(i) => Some(i),
            _ => None,
        }
    }

    /// Layers this one reads from, in argument order (duplicates kept).
    pub fn dependencies(&self) -> Vec<&LayerName> {
        match &self.kind {
            LayerKind::Input(_) => Vec::new(),
            LayerKind::Blockwise(b) => b.args.iter().map(LayerArg::layer).collect(),
            LayerKind::Reduction(r) => vec![&r.input],
        }
    }

    pub fn output_keys(&self) -> Vec<NodeKey> {
        (0..self.npartitions).map(|i| self.name.key(i)).collect()
    }

    /// Expand into concrete tasks, helper tasks included.
    pub fn tasks(&self) -> Result<Vec<(NodeKey, Task)>> {
        match &self.kind {
            LayerKind::Input(input) => Ok((0..self.npartitions)
                .map(|i| {
                    let task = Task {
                        func: TaskFn::Read {
                            source: input.source.clone(),
                            index: i,
                            columns: input.columns.clone(),
                        },
                        args: Vec::new(),
                    };
                    (self.name.key(i), task)
                })
                .collect()),
            LayerKind::Blockwise(b) => Ok((0..self.npartitions)
                .map(|i| {
                    let task = Task {
                        func: TaskFn::Apply(b.func.clone()),
                        args: b.args.iter().map(|a| a.key(i)).collect(),
                    };
                    (self.name.key(i), task)
                })
                .collect()),
            LayerKind::Reduction(r) => r.tasks(&self.name),
        }
    }
}
