//! Column projection.
//!
//! For each source read, the columns to fetch are derived from what tracing
//! recorded in the read's report plus what the outputs themselves carry:
//!
//! - leaf data touched anywhere, or reachable from an output's meta, is read;
//! - a list whose lengths are needed, or a field that was only accessed by
//!   name, needs *some* column under it: its first leaf, unless a required
//!   column already lives there;
//! - a report with nothing recorded, and no output contribution, reads
//!   everything;
//! - a report with only the zero-field request reads no columns at all.

use std::collections::BTreeMap;

use jagged_core::form::path_covers;
use jagged_core::{ColumnSet, Form, LayerName, Result};
use jagged_graph::{Graph, InputLayer, Layer, LayerKind};
use jagged_tracer::KeyKind;

/// Columns each reachable input layer needs; `None` means all of them.
pub fn necessary_columns(
    graph: &Graph,
    outputs: &[LayerName],
) -> Result<BTreeMap<LayerName, Option<ColumnSet>>> {
    let culled = graph.cull(outputs)?;
    let output_layers = outputs
        .iter()
        .map(|o| culled.get(o).cloned())
        .collect::<Result<Vec<_>>>()?;

    let mut out = BTreeMap::new();
    for layer in culled.input_layers() {
        if let Some(input) = layer.as_input() {
            let cols = required_for(input, &output_layers);
            out.insert(layer.name.clone(), cols);
        }
    }
    Ok(out)
}

fn required_for(input: &InputLayer, outputs: &[std::sync::Arc<Layer>]) -> Option<ColumnSet> {
    let form = input.source.form();
    let snap = input.report.snapshot();

    let mut data = snap.data.clone();
    let mut structural: Vec<String> = snap.shape.iter().chain(&snap.accessed).cloned().collect();
    let mut contributed = false;
    for o in outputs {
        for key in o.meta.lineage().keys_for(&input.report) {
            contributed = true;
            match key.kind {
                KeyKind::Leaf => {
                    data.insert(key.path);
                }
                KeyKind::Offsets | KeyKind::Structure => structural.push(key.path),
            }
        }
    }
    if snap.is_untouched() && !contributed {
        return None;
    }

    let all: ColumnSet = form.columns().into_iter().collect();
    let mut required: ColumnSet = data.into_iter().filter(|c| all.contains(c)).collect();
    for path in structural.iter().filter(|p| !p.is_empty()) {
        if required.iter().any(|c| path_covers(path, c)) {
            continue;
        }
        if let Some(c) = form.first_column_under(path) {
            required.insert(c);
        }
    }
    finish(form, &all, required)
}

fn finish(form: &Form, all: &ColumnSet, required: ColumnSet) -> Option<ColumnSet> {
    // Non-record rows cannot drop anything.
    if &required == all || !form.unwrap_optional().is_record() {
        None
    } else {
        Some(required)
    }
}

/// Rewrite every reachable input layer to read only what it needs.
///
/// The rewritten layer keeps its name, meta and report, so nothing
/// downstream changes. Sources that cannot project keep reading everything.
pub fn project_columns(graph: &Graph, outputs: &[LayerName]) -> Result<Graph> {
    let needed = necessary_columns(graph, outputs)?;
    let mut g = graph.clone();
    for (name, cols) in needed {
        let layer = g.get(&name)?.clone();
        let LayerKind::Input(input) = &layer.kind else {
            continue;
        };
        let columns = match &cols {
            Some(req) => input.source.project(req)?,
            None => None,
        };
        tracing::debug!(
            layer = %name,
            source = input.source.label(),
            columns = ?columns,
            "projected input layer"
        );
        if columns == input.columns {
            continue;
        }
        g = g.with_layer(Layer {
            kind: LayerKind::Input(InputLayer {
                source: input.source.clone(),
                columns,
                report: input.report.clone(),
            }),
            ..(*layer).clone()
        });
    }
    Ok(g)
}
