#![forbid(unsafe_code)]
//! jagged-planner: rewrites a layer graph before it is executed.
//!
//! Passes:
//! - [`columns`]: narrow every source read to the columns downstream code
//!   touched while the graph was traced.
//! - [`chains`]: fuse linear runs of blockwise layers into one layer.
//!
//! Both passes, and the final cull, only ever produce new graphs; the input
//! graph (and any collection holding it) stays valid.
//!
//! Design notes:
//! - Projection always restarts from the unprojected source, so running the
//!   optimizer on its own output changes nothing.
//! - A pass that fails is handled by `OnFail`: skipped with a warning,
//!   skipped silently, or returned to the caller.

pub mod chains;
pub mod columns;

use jagged_core::{LayerName, OnFail, OptimizationConfig, OptimizationPass, Result};
use jagged_graph::Graph;

pub use chains::fuse_layer_chains;
pub use columns::{necessary_columns, project_columns};

/// Cull to `outputs`, then run the configured passes in order.
pub fn optimize(graph: &Graph, outputs: &[LayerName], cfg: &OptimizationConfig) -> Result<Graph> {
    let mut g = graph.cull(outputs)?;
    if !cfg.enabled {
        return Ok(g);
    }
    for pass in &cfg.passes {
        let attempt = match pass {
            OptimizationPass::Columns => project_columns(&g, outputs),
            OptimizationPass::LayerChains => fuse_layer_chains(&g, outputs),
        };
        match attempt {
            Ok(next) => g = next,
            Err(e) => match cfg.on_fail {
                OnFail::Raise => return Err(e),
                OnFail::Warn => {
                    tracing::warn!(?pass, error = %e, "optimization pass failed; skipping it")
                }
                OnFail::Pass => {}
            },
        }
    }
    g.cull(outputs)
}
