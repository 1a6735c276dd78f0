//! Optimization state shared by collections and lazy scalars.

use std::sync::{Arc, OnceLock};

use jagged_core::{LayerName, OptimizationConfig};
use jagged_exec::{Engine, ExecError};
use jagged_graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unoptimized,
    Optimized,
}

/// Lazily filled optimized graph, tagged with the optimization settings
/// that produced it. Filled at most once; an engine with other settings
/// optimizes afresh without replacing the cached graph.
#[derive(Debug, Clone, Default)]
pub(crate) struct OptimizedGraph(Arc<OnceLock<(OptimizationConfig, Arc<Graph>)>>);

impl OptimizedGraph {
    pub(crate) fn filled(cfg: OptimizationConfig, graph: Arc<Graph>) -> Self {
        Self(Arc::new(OnceLock::from((cfg, graph))))
    }

    pub(crate) fn state(&self) -> State {
        if self.0.get().is_some() {
            State::Optimized
        } else {
            State::Unoptimized
        }
    }

    pub(crate) fn get_or_optimize(
        &self,
        graph: &Graph,
        output: &LayerName,
        engine: &Engine,
    ) -> Result<Arc<Graph>, ExecError> {
        let cfg = &engine.config().optimization;
        if let Some((cached_cfg, g)) = self.0.get() {
            if cached_cfg == cfg {
                return Ok(g.clone());
            }
            tracing::debug!(output = %output, "optimization settings differ from the cached graph");
            return Ok(Arc::new(engine.optimize(graph, std::slice::from_ref(output))?));
        }
        let optimized = Arc::new(engine.optimize(graph, std::slice::from_ref(output))?);
        tracing::debug!(
            output = %output,
            layers_before = graph.len(),
            layers_after = optimized.len(),
            fingerprint = %optimized.fingerprint()?.short(),
            "optimized graph"
        );
        let (_, g) = self.0.get_or_init(|| (cfg.clone(), optimized));
        Ok(g.clone())
    }
}
