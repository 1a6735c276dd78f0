//! Reductions over collections.
//!
//! Reductions that fold rows (`axis = None` or axis 0) cross partition
//! boundaries and become a fan-in tree: one partial per partition, then
//! combines of at most `split_every` partials until one value is left.
//! Deeper axes stay inside each row and are plain blockwise layers.

use jagged_core::{EngineConfig, Error, LayerName, Result};
use jagged_graph::{Layer, LayerArg, PartitionFn, ReductionLayer};
use jagged_tracer::{Datum, Op, ReduceAxis, Reducer};

use crate::collection::Collection;
use crate::scalar::LazyScalar;
use crate::state::OptimizedGraph;

/// A reduction result: a lazy scalar, or a collection when the reduction
/// kept some dimensions.
#[derive(Debug, Clone)]
pub enum Reduced {
    Scalar(LazyScalar),
    Array(Collection),
}

impl Reduced {
    pub fn into_scalar(self) -> Result<LazyScalar> {
        match self {
            Reduced::Scalar(s) => Ok(s),
            Reduced::Array(c) => Err(Error::TypeMismatch(format!(
                "expected a scalar, the reduction produced {}",
                c.form()
            ))),
        }
    }

    pub fn into_collection(self) -> Result<Collection> {
        match self {
            Reduced::Array(c) => Ok(c),
            Reduced::Scalar(s) => Err(Error::TypeMismatch(format!(
                "expected an array, the reduction produced a scalar of type {}",
                s.form()
            ))),
        }
    }
}

fn check_split_every(split_every: usize) -> Result<()> {
    if split_every < 2 {
        return Err(Error::Config(format!(
            "split_every must be at least 2, got {split_every}"
        )));
    }
    Ok(())
}

impl Collection {
    /// Reduce with the tree fan-in from `JAGGED_SPLIT_EVERY` (or its default).
    pub fn reduce(&self, reducer: Reducer, axis: Option<i64>) -> Result<Reduced> {
        self.reduce_split(reducer, axis, EngineConfig::from_env().split_every)
    }

    pub fn reduce_split(
        &self,
        reducer: Reducer,
        axis: Option<i64>,
        split_every: usize,
    ) -> Result<Reduced> {
        check_split_every(split_every)?;
        if self.npartitions() == 0 {
            return Err(Error::InvalidValue(format!(
                "cannot {} a collection with no partitions",
                reducer.name()
            )));
        }
        let meta = self.meta.reduce(reducer, axis)?;

        let tree_axis = match axis {
            None => Some(ReduceAxis::All),
            Some(a) => {
                // `reduce` above already rejected records and bad axes.
                let ndim = self.form().list_depth().unwrap_or(0) as i64 + 1;
                let k = if a < 0 { a + ndim } else { a };
                (k == 0).then_some(ReduceAxis::Rows)
            }
        };
        let Some(tree_axis) = tree_axis else {
            let name = LayerName::fresh(reducer.name());
            let out = Collection::blockwise(
                &[self],
                &[],
                name,
                PartitionFn::op(Op::Reduce { reducer, axis }),
                meta.into_array()?,
                self.sizes.clone(),
            );
            return Ok(Reduced::Array(out));
        };

        let name = LayerName::fresh(reducer.name());
        let layer = Layer::reduction(
            name.clone(),
            ReductionLayer {
                input: self.name.clone(),
                input_partitions: self.npartitions(),
                reducer,
                axis: tree_axis,
                split_every,
            },
            meta.clone(),
        );
        let graph = self.graph.with_layer(layer);
        tracing::debug!(
            reducer = reducer.name(),
            partitions = self.npartitions(),
            split_every,
            "built reduction tree"
        );
        Ok(match meta {
            Datum::Scalar(s) => Reduced::Scalar(LazyScalar::new(graph, name, s)),
            Datum::Array(a) => Reduced::Array(Collection {
                graph: graph.into(),
                name,
                meta: a,
                sizes: vec![None],
                optimized: OptimizedGraph::default(),
            }),
        })
    }

    pub fn sum(&self, axis: Option<i64>) -> Result<Reduced> {
        self.reduce(Reducer::Sum, axis)
    }

    pub fn count(&self, axis: Option<i64>) -> Result<Reduced> {
        self.reduce(Reducer::Count, axis)
    }

    pub fn min(&self, axis: Option<i64>) -> Result<Reduced> {
        self.reduce(Reducer::Min, axis)
    }

    pub fn max(&self, axis: Option<i64>) -> Result<Reduced> {
        self.reduce(Reducer::Max, axis)
    }

    pub fn any(&self, axis: Option<i64>) -> Result<Reduced> {
        self.reduce(Reducer::Any, axis)
    }

    pub fn all(&self, axis: Option<i64>) -> Result<Reduced> {
        self.reduce(Reducer::All, axis)
    }

    /// Mean of every value, as `sum / count`.
    pub fn mean(&self) -> Result<LazyScalar> {
        let total = self.sum(None)?.into_scalar()?;
        let n = self.count(None)?.into_scalar()?;
        total.binary(jagged_tracer::BinaryOp::Div, &n)
    }

    /// Total row count. Only asks the sources for row counts, so no column
    /// is read on its behalf.
    pub fn num_rows(&self) -> Result<LazyScalar> {
        self.num_rows_split(EngineConfig::from_env().split_every)
    }

    pub fn num_rows_split(&self, split_every: usize) -> Result<LazyScalar> {
        check_split_every(split_every)?;
        if self.npartitions() == 0 {
            return Err(Error::InvalidValue(
                "cannot count rows of a collection with no partitions".into(),
            ));
        }
        let lengths_meta = Op::Length.apply(&[Datum::Array(self.meta.clone())])?;
        let lengths = LayerName::fresh("length");
        let per_partition = Layer::blockwise(
            lengths.clone(),
            PartitionFn::op(Op::Length),
            vec![LayerArg::Partitioned(self.name.clone())],
            self.npartitions(),
            lengths_meta.clone(),
        );
        let meta = jagged_tracer::ops::reduce(&lengths_meta, Reducer::Sum, None)?.into_scalar()?;
        let name = LayerName::fresh("num-rows");
        let total = Layer::reduction(
            name.clone(),
            ReductionLayer {
                input: lengths,
                input_partitions: self.npartitions(),
                reducer: Reducer::Sum,
                axis: ReduceAxis::All,
                split_every,
            },
            Datum::Scalar(meta.clone()),
        );
        let graph = self.graph.with_layer(per_partition).with_layer(total);
        Ok(LazyScalar::new(graph, name, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jagged_core::{DataType, Form, Scalar};
    use serde_json::json;

    fn lists() -> Collection {
        Collection::from_json(
            "lists",
            Form::list(Form::primitive(DataType::Int64)),
            &[
                vec![json!([1, 2]), json!([3])],
                vec![json!([4, 5, 6])],
                vec![json!([]), json!([7])],
            ],
        )
        .unwrap()
    }

    #[test]
    fn full_reduction_is_a_scalar() {
        let total = lists().reduce_split(Reducer::Sum, None, 2).unwrap().into_scalar().unwrap();
        assert_eq!(total.compute().unwrap(), Scalar::I64(28));
        let n = lists().count(None).unwrap().into_scalar().unwrap();
        assert_eq!(n.compute().unwrap(), Scalar::I64(7));
        let biggest = lists().max(None).unwrap().into_scalar().unwrap();
        assert_eq!(biggest.compute().unwrap(), Scalar::I64(7));
    }

    #[test]
    fn axis_zero_crosses_partitions() {
        let cols = lists()
            .reduce_split(Reducer::Sum, Some(0), 2)
            .unwrap()
            .into_collection()
            .unwrap();
        assert_eq!(cols.npartitions(), 1);
        assert_eq!(cols.compute().unwrap().to_json().unwrap(), vec![json!(15), json!(7), json!(6)]);
    }

    #[test]
    fn inner_axis_stays_blockwise() {
        let per_row = lists().sum(Some(-1)).unwrap().into_collection().unwrap();
        assert_eq!(per_row.partition_sizes(), &[Some(2), Some(1), Some(2)]);
        assert_eq!(
            per_row.compute().unwrap().to_json().unwrap(),
            vec![json!(3), json!(3), json!(15), json!(0), json!(7)]
        );
    }

    #[test]
    fn bad_arguments_fail_while_building() {
        assert!(matches!(lists().reduce_split(Reducer::Sum, None, 1), Err(Error::Config(_))));
        assert!(matches!(lists().num_rows_split(1), Err(Error::Config(_))));
        assert!(matches!(lists().num_rows_split(0), Err(Error::Config(_))));
        assert!(matches!(lists().sum(Some(2)), Err(Error::InvalidValue(_))));
        assert!(lists().sum(None).unwrap().into_collection().is_err());
    }

    #[test]
    fn num_rows_reads_no_columns() {
        let rec = Collection::from_json(
            "rec",
            Form::record([
                ("a", Form::primitive(DataType::Int64)),
                ("b", Form::primitive(DataType::Int64)),
            ]),
            &[vec![json!({"a": 1, "b": 2})], vec![json!({"a": 3, "b": 4}), json!({"a": 5, "b": 6})]],
        )
        .unwrap();
        let n = rec.num_rows().unwrap();
        assert_eq!(n.compute().unwrap(), Scalar::I64(3));
        assert_eq!(rec.num_rows_split(2).unwrap().compute().unwrap(), Scalar::I64(3));
        let cols = jagged_planner::necessary_columns(n.graph(), std::slice::from_ref(n.name())).unwrap();
        let only = cols.values().next().unwrap();
        assert_eq!(only, &Some(Default::default()));
    }
}
