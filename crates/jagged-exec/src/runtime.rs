//! Engine: optimize, materialize tasks, execute, check output types.

use std::time::Instant;

use jagged_core::{EngineConfig, Error, LayerName};
use jagged_graph::Graph;
use jagged_tracer::{Array, Datum};

use crate::error::ExecError;
use crate::metrics::emit_span;
use crate::scheduler::{Scheduler, SyncScheduler};

/// Owns configuration and the scheduler used by `compute`.
pub struct Engine {
    cfg: EngineConfig,
    scheduler: Box<dyn Scheduler>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cfg", &self.cfg)
            .field("scheduler", &self.scheduler.name())
            .finish()
    }
}

impl Engine {
    /// Sequential engine.
    pub fn new(cfg: EngineConfig) -> Self {
        Self::with_scheduler(cfg, Box::new(SyncScheduler::new()))
    }

    pub fn with_scheduler(cfg: EngineConfig, scheduler: Box<dyn Scheduler>) -> Self {
        Self { cfg, scheduler }
    }

    /// Engine configured from `JAGGED_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    /// Concurrent engine bounded by `cfg.max_parallel_tasks`.
    #[cfg(feature = "async-scheduler")]
    pub fn new_async(cfg: EngineConfig) -> Result<Self, ExecError> {
        let sched = crate::scheduler::AsyncScheduler::new(cfg.max_parallel_tasks)?;
        Ok(Self::with_scheduler(cfg, Box::new(sched)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }

    /// Run the configured optimization passes for `outputs`.
    pub fn optimize(&self, graph: &Graph, outputs: &[LayerName]) -> Result<Graph, ExecError> {
        jagged_planner::optimize(graph, outputs, &self.cfg.optimization).map_err(ExecError::Optimize)
    }

    /// Execute `graph` as given (no optimization) and return every partition
    /// of every output, checked against the output layer's meta.
    pub fn execute(
        &self,
        graph: &Graph,
        outputs: &[LayerName],
    ) -> Result<Vec<Vec<Datum>>, ExecError> {
        let started = Instant::now();
        let tasks = graph.tasks(outputs)?;

        let mut keys = Vec::new();
        let mut layers = Vec::with_capacity(outputs.len());
        for name in outputs {
            let layer = graph.get(name)?;
            keys.extend(layer.output_keys());
            layers.push(layer.clone());
        }
        let mut results = self.scheduler.execute(&tasks, &keys)?.into_iter();

        let mut out = Vec::with_capacity(layers.len());
        for layer in &layers {
            let mut parts = Vec::with_capacity(layer.npartitions);
            for i in 0..layer.npartitions {
                let part = results
                    .next()
                    .ok_or_else(|| ExecError::MissingTask(layer.name.key(i)))?;
                check_partition(&layer.meta, &part)
                    .map_err(|e| ExecError::partition(&layer.name.key(i), e))?;
                parts.push(part);
            }
            out.push(parts);
        }

        let elapsed = started.elapsed();
        tracing::debug!(
            scheduler = self.scheduler.name(),
            tasks = tasks.len(),
            outputs = outputs.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "compute finished"
        );
        emit_span(
            "compute",
            &[
                ("tasks", tasks.len().to_string()),
                ("elapsed_ms", elapsed.as_millis().to_string()),
            ],
        );
        Ok(out)
    }

    /// Optimize, then execute.
    pub fn compute(
        &self,
        graph: &Graph,
        outputs: &[LayerName],
    ) -> Result<Vec<Vec<Datum>>, ExecError> {
        let optimized = self.optimize(graph, outputs)?;
        self.execute(&optimized, outputs)
    }
}

fn check_partition(meta: &Datum, part: &Datum) -> Result<(), Error> {
    if part.is_typetracer() {
        return Err(Error::Invariant("task produced a typetracer".into()));
    }
    if !part.same_type(meta) || part.is_scalar() != meta.is_scalar() {
        return Err(Error::Invariant(format!(
            "partition has type {} but meta declares {}",
            part.form(),
            meta.form()
        )));
    }
    Ok(())
}

/// Join the computed partitions of one output into a single value: arrays
/// concatenate in partition order; a scalar output has exactly one part.
pub fn assemble(meta: &Datum, parts: Vec<Datum>) -> Result<Datum, Error> {
    match meta {
        Datum::Scalar(_) => {
            let mut it = parts.into_iter();
            match (it.next(), it.next()) {
                (Some(only), None) => Ok(only),
                _ => Err(Error::Invariant(
                    "a scalar output must have exactly one partition".into(),
                )),
            }
        }
        Datum::Array(m) => {
            let arrays = parts
                .into_iter()
                .map(Datum::into_array)
                .collect::<Result<Vec<_>, _>>()?;
            Array::concat(m.form().clone(), arrays).map(Datum::Array)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jagged_core::{DataType, Form, OptimizationConfig};
    use jagged_graph::{Layer, LayerArg, PartitionFn};
    use jagged_io::MemorySource;
    use jagged_tracer::{Op, Report};
    use serde_json::json;

    fn pairs() -> (Graph, LayerName, Arc<MemorySource>) {
        let form = Form::record([
            ("x", Form::primitive(DataType::Int64)),
            ("y", Form::primitive(DataType::Utf8)),
        ]);
        let src = Arc::new(
            MemorySource::from_json(
                "pairs",
                form.clone(),
                &[
                    vec![json!({"x": 1, "y": "a"}), json!({"x": 2, "y": "b"})],
                    vec![json!({"x": 3, "y": "c"})],
                ],
            )
            .unwrap(),
        );
        let report = Report::new();
        let meta = Datum::Array(Array::source_tracer(form, &report, None));
        let read = LayerName::new("read");
        let x_meta = Op::Field("x".into()).apply(std::slice::from_ref(&meta)).unwrap();
        let x = LayerName::new("x");
        let g = Graph::from_layer(Layer::input(read.clone(), src.clone(), report, meta)).with_layer(
            Layer::blockwise(
                x.clone(),
                PartitionFn::op(Op::Field("x".into())),
                vec![LayerArg::Partitioned(read)],
                2,
                x_meta,
            ),
        );
        (g, x, src)
    }

    #[test]
    fn compute_projects_and_assembles() {
        let (g, x, src) = pairs();
        let engine = Engine::default();
        let mut out = engine.compute(&g, std::slice::from_ref(&x)).unwrap();
        let meta = g.get(&x).unwrap().meta.clone();
        let all = assemble(&meta, out.remove(0)).unwrap().into_array().unwrap();
        assert_eq!(all.to_json().unwrap(), vec![json!(1), json!(2), json!(3)]);
        for read in src.reads() {
            assert_eq!(read.columns, Some(["x".to_string()].into()));
        }
        assert_eq!(src.reads().len(), 2);
    }

    #[test]
    fn disabled_optimization_reads_everything() {
        let (g, x, src) = pairs();
        let mut cfg = EngineConfig::default();
        cfg.optimization = OptimizationConfig {
            enabled: false,
            ..Default::default()
        };
        Engine::new(cfg).compute(&g, &[x]).unwrap();
        assert!(src.reads().iter().all(|r| r.columns.is_none()));
    }

    #[test]
    fn wrong_output_type_is_caught() {
        let (g, _, _) = pairs();
        let liar = LayerName::new("liar");
        let g = g.with_layer(Layer::blockwise(
            liar.clone(),
            PartitionFn::op(Op::Field("x".into())),
            vec![LayerArg::Partitioned(LayerName::new("read"))],
            2,
            Datum::Array(Array::typetracer(Form::primitive(DataType::Utf8))),
        ));
        let err = Engine::default().execute(&g, &[liar]).unwrap_err();
        assert!(matches!(err, ExecError::PartitionCompute { partition: 0, .. }));
    }
}
