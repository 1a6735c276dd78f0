//! Layer-chain fusion.
//!
//! A blockwise layer whose only argument is the partitions of another
//! blockwise layer, where that producer feeds nothing else, is not an
//! output, and has the same partition count, absorbs the producer: the fused
//! layer keeps the consumer's name and meta, takes the producer's arguments,
//! and runs `producer.then(consumer)` per partition.

use std::collections::BTreeSet;

use jagged_core::{LayerName, Result};
use jagged_graph::{Graph, Layer, LayerArg, LayerKind};

pub fn fuse_layer_chains(graph: &Graph, outputs: &[LayerName]) -> Result<Graph> {
    let outputs: BTreeSet<&LayerName> = outputs.iter().collect();
    let mut g = graph.clone();
    let mut fused = 0usize;
    while let Some((producer, consumer)) = next_pair(&g, &outputs)? {
        let (LayerKind::Blockwise(p), LayerKind::Blockwise(c)) = (&producer.kind, &consumer.kind)
        else {
            break;
        };
        let merged = Layer::blockwise(
            consumer.name.clone(),
            p.func.then(&c.func),
            p.args.clone(),
            consumer.npartitions,
            consumer.meta.clone(),
        );
        g = g.without(&producer.name).with_layer(merged);
        fused += 1;
    }
    if fused > 0 {
        tracing::debug!(fused, "fused blockwise layers");
    }
    Ok(g)
}

fn next_pair(
    g: &Graph,
    outputs: &BTreeSet<&LayerName>,
) -> Result<Option<(std::sync::Arc<Layer>, std::sync::Arc<Layer>)>> {
    let dependents = g.dependents();
    for name in g.topological_order()? {
        let consumer = g.get(&name)?;
        let LayerKind::Blockwise(c) = &consumer.kind else {
            continue;
        };
        let [LayerArg::Partitioned(pname)] = c.args.as_slice() else {
            continue;
        };
        let producer = g.get(pname)?;
        let single_use = dependents.get(pname).is_some_and(|d| d.len() == 1);
        if producer.is_blockwise()
            && single_use
            && !outputs.contains(pname)
            && producer.npartitions == consumer.npartitions
        {
            return Ok(Some((producer.clone(), consumer.clone())));
        }
    }
    Ok(None)
}
