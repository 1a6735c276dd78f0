//! The layer graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use jagged_core::hash::hash_serde;
use jagged_core::{Error, Hash256, LayerName, Result};
use serde::{Deserialize, Serialize};

use crate::layer::{Layer, LayerArg, LayerKind};
use crate::task::TaskGraph;

/// Layers keyed by name. Cloning is cheap; layers are shared.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    layers: BTreeMap<LayerName, Arc<Layer>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layer(layer: Layer) -> Self {
        Self::new().with_layer(layer)
    }

    /// Union of both graphs. Layer names are unique, so a name present in
    /// both refers to the same layer.
    pub fn merge(&self, other: &Graph) -> Graph {
        let mut layers = self.layers.clone();
        for (name, layer) in &other.layers {
            layers.entry(name.clone()).or_insert_with(|| layer.clone());
        }
        Graph { layers }
    }

    /// Copy of this graph with `layer` added, replacing any layer of the
    /// same name.
    pub fn with_layer(&self, layer: Layer) -> Graph {
        let mut layers = self.layers.clone();
        layers.insert(layer.name.clone(), Arc::new(layer));
        Graph { layers }
    }

    pub fn without(&self, name: &LayerName) -> Graph {
        let mut layers = self.layers.clone();
        layers.remove(name);
        Graph { layers }
    }

    pub fn layer(&self, name: &LayerName) -> Option<&Arc<Layer>> {
        self.layers.get(name)
    }

    pub fn get(&self, name: &LayerName) -> Result<&Arc<Layer>> {
        self.layers
            .get(name)
            .ok_or_else(|| Error::Invariant(format!("graph has no layer `{name}`")))
    }

    pub fn contains(&self, name: &LayerName) -> bool {
        self.layers.contains_key(name)
    }

    pub fn layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers.values()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_layers(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers.values().filter(|l| l.as_input().is_some())
    }

    /// For every layer, the distinct layers that read from it.
    pub fn dependents(&self) -> BTreeMap<LayerName, BTreeSet<LayerName>> {
        let mut out: BTreeMap<LayerName, BTreeSet<LayerName>> = self
            .layers
            .keys()
            .map(|n| (n.clone(), BTreeSet::new()))
            .collect();
        for layer in self.layers.values() {
            for dep in layer.dependencies() {
                out.entry(dep.clone())
                    .or_default()
                    .insert(layer.name.clone());
            }
        }
        out
    }

    /// Dependencies before dependents. Fails on dangling references or cycles.
    pub fn topological_order(&self) -> Result<Vec<LayerName>> {
        let mut indegree: BTreeMap<&LayerName, usize> = BTreeMap::new();
        for layer in self.layers.values() {
            let deps: BTreeSet<&LayerName> = layer.dependencies().into_iter().collect();
            for dep in &deps {
                if !self.layers.contains_key(*dep) {
                    return Err(Error::Invariant(format!(
                        "layer `{}` depends on missing layer `{dep}`",
                        layer.name
                    )));
                }
            }
            indegree.insert(&layer.name, deps.len());
        }
        let dependents = self.dependents();

        let mut ready: VecDeque<&LayerName> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.layers.len());
        while let Some(name) = ready.pop_front() {
            order.push(name.clone());
            if let Some(next) = dependents.get(name) {
                for n in next {
                    if let Some(d) = indegree.get_mut(n) {
                        *d -= 1;
                        if *d == 0 {
                            ready.push_back(n);
                        }
                    }
                }
            }
        }
        if order.len() != self.layers.len() {
            return Err(Error::Invariant("layer graph has a cycle".into()));
        }
        Ok(order)
    }

    /// Check structural invariants: acyclic, no dangling references, and
    /// partition counts that line up along every edge.
    pub fn validate(&self) -> Result<()> {
        self.topological_order()?;
        for layer in self.layers.values() {
            match &layer.kind {
                LayerKind::Input(input) => {
                    if input.source.npartitions() != layer.npartitions {
                        return Err(Error::Invariant(format!(
                            "input `{}` declares {} partitions, source has {}",
                            layer.name,
                            layer.npartitions,
                            input.source.npartitions()
                        )));
                    }
                }
                LayerKind::Blockwise(b) => {
                    for arg in &b.args {
                        let dep = self.get(arg.layer())?;
                        let expected = match arg {
                            LayerArg::Partitioned(_) => layer.npartitions,
                            LayerArg::Broadcast(_) => 1,
                        };
                        if dep.npartitions != expected {
                            return Err(Error::PartitionAlignment(format!(
                                "`{}` reads {} partitions from `{}`, which has {}",
                                layer.name, expected, dep.name, dep.npartitions
                            )));
                        }
                    }
                }
                LayerKind::Reduction(r) => {
                    let dep = self.get(&r.input)?;
                    if dep.npartitions != r.input_partitions {
                        return Err(Error::Invariant(format!(
                            "reduction `{}` expects {} partitions, `{}` has {}",
                            layer.name, r.input_partitions, dep.name, dep.npartitions
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Only the layers `outputs` transitively depend on.
    pub fn cull(&self, outputs: &[LayerName]) -> Result<Graph> {
        let mut keep = BTreeMap::new();
        let mut stack: Vec<&LayerName> = outputs.iter().collect();
        while let Some(name) = stack.pop() {
            if keep.contains_key(name) {
                continue;
            }
            let layer = self.get(name)?;
            keep.insert(name.clone(), layer.clone());
            stack.extend(layer.dependencies());
        }
        Ok(Graph { layers: keep })
    }

    /// Materialize the tasks needed for `outputs`.
    pub fn tasks(&self, outputs: &[LayerName]) -> Result<TaskGraph> {
        let culled = self.cull(outputs)?;
        culled.validate()?;
        let mut out = TaskGraph::new();
        for layer in culled.layers.values() {
            for (key, task) in layer.tasks()? {
                if out.insert(key.clone(), task).is_some() {
                    return Err(Error::Invariant(format!("duplicate task key {key}")));
                }
            }
        }
        Ok(out)
    }

    pub fn summary(&self) -> Result<GraphSummary> {
        let layers = self
            .topological_order()?
            .iter()
            .map(|n| self.get(n).map(|l| LayerSummary::of(l)))
            .collect::<Result<Vec<_>>>()?;
        Ok(GraphSummary { layers })
    }

    /// Content hash of the summary: layer names, kinds, wiring, forms and
    /// projected columns.
    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(&self.summary()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub name: String,
    pub kind: String,
    pub npartitions: usize,
    pub dependencies: Vec<String>,
    /// Function label, source label plus columns, or reducer.
    pub detail: String,
    pub form: String,
}

impl LayerSummary {
    fn of(layer: &Layer) -> Self {
        let detail = match &layer.kind {
            LayerKind::Input(i) => match &i.columns {
                Some(cols) => format!(
                    "{} [{}]",
                    i.source.label(),
                    cols.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
                None => format!("{} [*]", i.source.label()),
            },
            LayerKind::Blockwise(b) => b.func.label().to_string(),
            LayerKind::Reduction(r) => {
                format!("{} split_every={}", r.reducer.name(), r.split_every)
            }
        };
        Self {
            name: layer.name.to_string(),
            kind: layer.kind_name().to_string(),
            npartitions: layer.npartitions,
            dependencies: layer.dependencies().iter().map(|d| d.to_string()).collect(),
            detail,
            form: layer.meta.form().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub layers: Vec<LayerSummary>,
}

impl fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for l in &self.layers {
            writeln!(
                f,
                "{} {} x{} <- [{}] {} :: {}",
                l.kind,
                l.name,
                l.npartitions,
                l.dependencies.join(", "),
                l.detail,
                l.form
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::PartitionFn;
    use crate::layer::{LayerArg, ReductionLayer};
    use crate::source::Source;
    use jagged_core::{ColumnSet, DataType, Form};
    use jagged_tracer::{Array, Datum, ReduceAxis, Reducer, Report, TypedScalar};

    #[derive(Debug)]
    struct Fixed {
        form: Form,
        parts: usize,
    }

    impl Source for Fixed {
        fn label(&self) -> &str {
            "fixed"
        }
        fn form(&self) -> &Form {
            &self.form
        }
        fn npartitions(&self) -> usize {
            self.parts
        }
        fn read_partition(&self, _index: usize, _columns: Option<&ColumnSet>) -> Result<Array> {
            Array::from_json(self.form.clone(), &[serde_json::json!(1)])
        }
    }

    fn input(name: &str, parts: usize) -> Layer {
        let form = Form::primitive(DataType::Int64);
        let report = Report::new();
        let meta = Array::source_tracer(form.clone(), &report, None);
        Layer::input(
            LayerName::new(name),
            Arc::new(Fixed { form, parts }),
            report,
            Datum::Array(meta),
        )
    }

    fn map(name: &str, from: &str, parts: usize) -> Layer {
        Layer::blockwise(
            LayerName::new(name),
            PartitionFn::new("id", |a| Ok(a[0].clone())),
            vec![LayerArg::Partitioned(LayerName::new(from))],
            parts,
            Datum::Array(Array::typetracer(Form::primitive(DataType::Int64))),
        )
    }

    #[test]
    fn order_and_cull() {
        let g = Graph::from_layer(input("a", 2))
            .with_layer(map("b", "a", 2))
            .with_layer(map("c", "b", 2))
            .merge(&Graph::from_layer(input("z", 5)));
        let order = g.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x.as_str() == n).unwrap();
        assert!(pos("a") < pos("b") && pos("b") < pos("c"));

        let culled = g.cull(&[LayerName::new("b")]).unwrap();
        assert_eq!(culled.len(), 2);
        assert!(!culled.contains(&LayerName::new("z")));

        let tasks = g.tasks(&[LayerName::new("c")]).unwrap();
        assert_eq!(tasks.len(), 6);
    }

    #[test]
    fn misaligned_partitions_fail_validation() {
        let g = Graph::from_layer(input("a", 3)).with_layer(map("b", "a", 4));
        assert!(matches!(g.validate(), Err(Error::PartitionAlignment(_))));
    }

    #[test]
    fn dangling_dependency_is_reported() {
        let g = Graph::from_layer(map("b", "nowhere", 1));
        assert!(g.topological_order().is_err());
    }

    #[test]
    fn reduction_tasks_run_end_to_end() {
        let total = Layer::reduction(
            LayerName::new("total"),
            ReductionLayer {
                input: LayerName::new("a"),
                input_partitions: 3,
                reducer: Reducer::Sum,
                axis: ReduceAxis::All,
                split_every: 2,
            },
            Datum::Scalar(TypedScalar::unknown(Form::primitive(DataType::Int64))),
        );
        let g = Graph::from_layer(input("a", 3)).with_layer(total);
        let tasks = g.tasks(&[LayerName::new("total")]).unwrap();
        // 3 reads, 3 partials, 2 combines, final
        assert_eq!(tasks.len(), 3 + 3 + 2 + 1);
    }

    #[test]
    fn fingerprint_tracks_structure() {
        let g1 = Graph::from_layer(input("a", 2)).with_layer(map("b", "a", 2));
        let g2 = Graph::from_layer(input("a", 2)).with_layer(map("b", "a", 2));
        let g3 = g1.with_layer(map("c", "b", 2));
        assert_eq!(g1.fingerprint().unwrap(), g2.fingerprint().unwrap());
        assert_ne!(g1.fingerprint().unwrap(), g3.fingerprint().unwrap());
        assert!(g3.summary().unwrap().to_string().contains("blockwise c x2 <- [b]"));
    }
}
