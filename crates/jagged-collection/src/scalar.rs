//! Lazily computed scalars, the result of full reductions.

use std::fmt;
use std::sync::Arc;

use jagged_core::{Form, LayerName, Result, Scalar};
use jagged_exec::{assemble, Engine, ExecError};
use jagged_graph::{Graph, Layer, LayerArg, PartitionFn};
use jagged_tracer::{BinaryOp, Datum, Op, TypedScalar};

use crate::state::{OptimizedGraph, State};

/// A single value backed by a one-partition output layer.
#[derive(Clone)]
pub struct LazyScalar {
    pub(crate) graph: Arc<Graph>,
    pub(crate) name: LayerName,
    pub(crate) meta: TypedScalar,
    pub(crate) optimized: OptimizedGraph,
}

impl fmt::Debug for LazyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyScalar")
            .field("name", &self.name.as_str())
            .field("type", &self.meta.form().to_string())
            .field("state", &self.state())
            .finish()
    }
}

impl LazyScalar {
    pub(crate) fn new(graph: Graph, name: LayerName, meta: TypedScalar) -> Self {
        Self {
            graph: Arc::new(graph),
            name,
            meta,
            optimized: OptimizedGraph::default(),
        }
    }

    pub fn name(&self) -> &LayerName {
        &self.name
    }

    /// Typetracer scalar: the type without a value.
    pub fn meta(&self) -> &TypedScalar {
        &self.meta
    }

    pub fn form(&self) -> &Form {
        self.meta.form()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn state(&self) -> State {
        self.optimized.state()
    }

    /// `self op other`, still lazy.
    pub fn binary(&self, op: BinaryOp, other: &LazyScalar) -> Result<LazyScalar> {
        let graph = self.graph.merge(&other.graph);
        self.derive(
            graph,
            Op::Binary(op),
            vec![
                LayerArg::Partitioned(self.name.clone()),
                LayerArg::Partitioned(other.name.clone()),
            ],
            &[Datum::Scalar(self.meta.clone()), Datum::Scalar(other.meta.clone())],
        )
    }

    pub fn binary_scalar(&self, op: BinaryOp, value: Scalar) -> Result<LazyScalar> {
        self.derive(
            (*self.graph).clone(),
            Op::BinaryScalar(op, value),
            vec![LayerArg::Partitioned(self.name.clone())],
            &[Datum::Scalar(self.meta.clone())],
        )
    }

    fn derive(&self, graph: Graph, op: Op, args: Vec<LayerArg>, metas: &[Datum]) -> Result<LazyScalar> {
        let meta = op.apply(metas)?.into_scalar()?;
        let name = LayerName::fresh(op.name());
        let layer = Layer::blockwise(
            name.clone(),
            PartitionFn::op(op),
            args,
            1,
            Datum::Scalar(meta.clone()),
        );
        Ok(LazyScalar::new(graph.with_layer(layer), name, meta))
    }

    pub fn optimize(&self) -> std::result::Result<LazyScalar, ExecError> {
        self.optimize_with(&Engine::from_env())
    }

    pub fn optimize_with(&self, engine: &Engine) -> std::result::Result<LazyScalar, ExecError> {
        let g = self.optimized.get_or_optimize(&self.graph, &self.name, engine)?;
        Ok(LazyScalar {
            optimized: OptimizedGraph::filled(engine.config().optimization.clone(), g),
            ..self.clone()
        })
    }

    pub fn compute(&self) -> std::result::Result<Scalar, ExecError> {
        self.compute_with(&Engine::from_env())
    }

    pub fn compute_with(&self, engine: &Engine) -> std::result::Result<Scalar, ExecError> {
        let g = self.optimized.get_or_optimize(&self.graph, &self.name, engine)?;
        let parts = engine
            .execute(&g, std::slice::from_ref(&self.name))?
            .into_iter()
            .next()
            .ok_or_else(|| ExecError::MissingTask(self.name.key(0)))?;
        let value = assemble(&Datum::Scalar(self.meta.clone()), parts)?.into_scalar()?;
        Ok(value.value()?.clone())
    }
}
