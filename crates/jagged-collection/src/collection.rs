//! The lazy partitioned collection.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use jagged_core::{ColumnSet, Error, Form, LayerName, Result};
use jagged_exec::{assemble, Engine, ExecError};
use jagged_graph::{Graph, Layer, LayerArg, PartitionFn, Source};
use jagged_io::{JsonLinesSource, MemorySource};
use jagged_tracer::{Array, Datum, Op, Report};

use crate::state::{OptimizedGraph, State};

/// A lazy array split into partitions.
///
/// Cloning is cheap: the graph is shared, and clones share the optimization
/// cache.
#[derive(Clone)]
pub struct Collection {
    pub(crate) graph: Arc<Graph>,
    pub(crate) name: LayerName,
    pub(crate) meta: Array,
    pub(crate) sizes: Vec<Option<usize>>,
    pub(crate) optimized: OptimizedGraph,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name.as_str())
            .field("npartitions", &self.sizes.len())
            .field("type", &self.meta.form().to_string())
            .field("state", &self.state())
            .finish()
    }
}

impl Collection {
    /// One input layer reading every partition of `source`.
    pub fn from_source(source: Arc<dyn Source>) -> Collection {
        let report = Report::new();
        let meta = Array::source_tracer(source.form().clone(), &report, None);
        let name = LayerName::fresh(&format!("from-{}", source.label()));
        let n = source.npartitions();
        let mut sizes = source.partition_sizes();
        sizes.resize(n, None);
        let layer = Layer::input(name.clone(), source, report, Datum::Array(meta.clone()));
        Collection {
            graph: Arc::new(Graph::from_layer(layer)),
            name,
            meta,
            sizes,
            optimized: OptimizedGraph::default(),
        }
    }

    /// In-memory partitions, one array each.
    pub fn from_arrays(label: &str, form: Form, partitions: Vec<Array>) -> Result<Collection> {
        let src = MemorySource::new(label, form, partitions)?;
        Ok(Collection::from_source(Arc::new(src)))
    }

    pub fn from_json(
        label: &str,
        form: Form,
        partitions: &[Vec<serde_json::Value>],
    ) -> Result<Collection> {
        let src = MemorySource::from_json(label, form, partitions)?;
        Ok(Collection::from_source(Arc::new(src)))
    }

    /// One partition per newline-delimited JSON file.
    pub fn from_json_lines<P: AsRef<Path>>(
        form: Form,
        paths: impl IntoIterator<Item = P>,
    ) -> Collection {
        Collection::from_source(Arc::new(JsonLinesSource::new(form, paths)))
    }

    pub fn name(&self) -> &LayerName {
        &self.name
    }

    /// Typetracer describing every partition.
    pub fn meta(&self) -> &Array {
        &self.meta
    }

    pub fn form(&self) -> &Form {
        self.meta.form()
    }

    pub fn npartitions(&self) -> usize {
        self.sizes.len()
    }

    pub fn partition_sizes(&self) -> &[Option<usize>] {
        &self.sizes
    }

    /// Total row count, if every partition size is known.
    pub fn known_len(&self) -> Option<usize> {
        self.sizes.iter().copied().sum()
    }

    /// The unoptimized graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn state(&self) -> State {
        self.optimized.state()
    }

    /// Apply `f` to every partition. Without `meta`, `f` is traced on this
    /// collection's meta to find the output type.
    pub fn map_partitions<F>(&self, label: &str, meta: Option<Array>, f: F) -> Result<Collection>
    where
        F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
    {
        map_partitions(label, &[self], meta, move |arrays: &[Array]| f(&arrays[0]))
    }

    /// Optimize with an engine configured from the environment.
    pub fn optimize(&self) -> std::result::Result<Collection, ExecError> {
        self.optimize_with(&Engine::from_env())
    }

    /// Optimize once (caching the result on `self`) and return a collection
    /// in the optimized state. Meta and partition sizes are unchanged.
    pub fn optimize_with(&self, engine: &Engine) -> std::result::Result<Collection, ExecError> {
        let g = self.optimized_graph(engine)?;
        Ok(Collection {
            optimized: OptimizedGraph::filled(engine.config().optimization.clone(), g),
            ..self.clone()
        })
    }

    pub fn optimized_graph(&self, engine: &Engine) -> std::result::Result<Arc<Graph>, ExecError> {
        self.optimized.get_or_optimize(&self.graph, &self.name, engine)
    }

    /// Columns each source read would fetch; `None` means all of them.
    pub fn necessary_columns(&self) -> Result<BTreeMap<LayerName, Option<ColumnSet>>> {
        jagged_planner::necessary_columns(&self.graph, std::slice::from_ref(&self.name))
    }

    pub fn compute(&self) -> std::result::Result<Array, ExecError> {
        self.compute_with(&Engine::from_env())
    }

    pub fn compute_with(&self, engine: &Engine) -> std::result::Result<Array, ExecError> {
        let g = self.optimized_graph(engine)?;
        let parts = engine
            .execute(&g, std::slice::from_ref(&self.name))?
            .into_iter()
            .next()
            .ok_or_else(|| ExecError::MissingTask(self.name.key(0)))?;
        Ok(assemble(&Datum::Array(self.meta.clone()), parts)?.into_array()?)
    }

    /// Compute several collections over one merged graph, so layers they
    /// share (source reads in particular) run once.
    pub fn compute_all(collections: &[&Collection]) -> std::result::Result<Vec<Array>, ExecError> {
        Collection::compute_all_with(&Engine::from_env(), collections)
    }

    pub fn compute_all_with(
        engine: &Engine,
        collections: &[&Collection],
    ) -> std::result::Result<Vec<Array>, ExecError> {
        let Some(first) = collections.first() else {
            return Ok(Vec::new());
        };
        let merged = collections
            .iter()
            .skip(1)
            .fold((*first.graph).clone(), |g, c| g.merge(&c.graph));
        let outputs: Vec<LayerName> = collections.iter().map(|c| c.name.clone()).collect();
        let results = engine.compute(&merged, &outputs)?;
        collections
            .iter()
            .zip(results)
            .map(|(c, parts)| {
                Ok(assemble(&Datum::Array(c.meta.clone()), parts)?.into_array()?)
            })
            .collect()
    }

    /// Same collection with every partition size known, found by computing
    /// per-partition row counts.
    pub fn with_computed_sizes(&self) -> std::result::Result<Collection, ExecError> {
        self.with_computed_sizes_with(&Engine::from_env())
    }

    pub fn with_computed_sizes_with(
        &self,
        engine: &Engine,
    ) -> std::result::Result<Collection, ExecError> {
        if self.sizes.iter().all(Option::is_some) {
            return Ok(self.clone());
        }
        let meta = Op::Length.apply(&[Datum::Array(self.meta.clone())])?;
        let name = LayerName::fresh("length");
        let layer = Layer::blockwise(
            name.clone(),
            PartitionFn::op(Op::Length),
            vec![LayerArg::Partitioned(self.name.clone())],
            self.npartitions(),
            meta,
        );
        let g = self.graph.with_layer(layer);
        let parts = engine
            .compute(&g, std::slice::from_ref(&name))?
            .into_iter()
            .next()
            .ok_or_else(|| ExecError::MissingTask(name.key(0)))?;
        let sizes = parts
            .into_iter()
            .map(|d| {
                let n = d.into_scalar()?.value()?.as_i64().ok_or_else(|| {
                    Error::Invariant("row count is not an integer".into())
                })?;
                usize::try_from(n)
                    .map(Some)
                    .map_err(|_| Error::Invariant(format!("negative row count {n}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Collection {
            sizes,
            ..self.clone()
        })
    }

    /// Append a blockwise layer over `inputs` (all partitioned alike).
    pub(crate) fn blockwise(
        inputs: &[&Collection],
        extra: &[(&Graph, LayerArg)],
        name: LayerName,
        func: PartitionFn,
        meta: Array,
        sizes: Vec<Option<usize>>,
    ) -> Collection {
        let mut graph = Graph::new();
        let mut args = Vec::with_capacity(inputs.len() + extra.len());
        for c in inputs {
            graph = graph.merge(&c.graph);
            args.push(LayerArg::Partitioned(c.name.clone()));
        }
        for (g, arg) in extra {
            graph = graph.merge(g);
            args.push(arg.clone());
        }
        let layer = Layer::blockwise(
            name.clone(),
            func,
            args,
            sizes.len(),
            Datum::Array(meta.clone()),
        );
        Collection {
            graph: Arc::new(graph.with_layer(layer)),
            name,
            meta,
            sizes,
            optimized: OptimizedGraph::default(),
        }
    }
}

/// Inputs must agree on partition count and on every partition size known
/// for both.
pub(crate) fn check_aligned(inputs: &[&Collection]) -> Result<()> {
    let Some(first) = inputs.first() else {
        return Ok(());
    };
    for other in &inputs[1..] {
        if other.npartitions() != first.npartitions() {
            return Err(Error::PartitionAlignment(format!(
                "`{}` has {} partitions but `{}` has {}",
                first.name,
                first.npartitions(),
                other.name,
                other.npartitions()
            )));
        }
        for (i, (a, b)) in first.sizes.iter().zip(&other.sizes).enumerate() {
            if let (Some(a), Some(b)) = (a, b) {
                if a != b {
                    return Err(Error::PartitionAlignment(format!(
                        "partition {i} has {a} rows in `{}` but {b} in `{}`",
                        first.name, other.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Per-partition sizes shared by aligned inputs.
pub(crate) fn joint_sizes(inputs: &[&Collection]) -> Vec<Option<usize>> {
    let n = inputs.first().map_or(0, |c| c.npartitions());
    (0..n)
        .map(|i| inputs.iter().find_map(|c| c.sizes[i]))
        .collect()
}

/// Apply `f` to corresponding partitions of `inputs`.
///
/// Without `meta`, `f` runs once on the inputs' typetracers; whatever it
/// touches is what the source reads will fetch. With an explicit `meta` the
/// function is not traced and every input is marked as fully read. Output
/// partition sizes are unknown.
pub fn map_partitions<F>(
    label: &str,
    inputs: &[&Collection],
    meta: Option<Array>,
    f: F,
) -> Result<Collection>
where
    F: Fn(&[Array]) -> Result<Array> + Send + Sync + 'static,
{
    let first = inputs
        .first()
        .ok_or_else(|| Error::InvalidValue("map_partitions needs at least one input".into()))?;
    check_aligned(inputs)?;

    let f = Arc::new(f);
    let meta = match meta {
        Some(m) => {
            for c in inputs {
                c.meta.touch_data();
            }
            Array::typetracer(m.form().clone())
        }
        None => {
            let metas: Vec<Array> = inputs.iter().map(|c| c.meta.clone()).collect();
            let out = f(&metas)?;
            if out.is_typetracer() {
                out
            } else {
                Array::typetracer(out.form().clone())
            }
        }
    };

    let func = {
        let f = f.clone();
        PartitionFn::new(label, move |args: &[Datum]| {
            let arrays = args
                .iter()
                .map(|d| d.as_array().cloned())
                .collect::<Result<Vec<_>>>()?;
            f(&arrays).map(Datum::Array)
        })
    };
    Ok(Collection::blockwise(
        inputs,
        &[],
        LayerName::fresh(label),
        func,
        meta,
        vec![None; first.npartitions()],
    ))
}
