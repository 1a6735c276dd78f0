//! End-to-end behavior of collections: types, alignment, reductions.


use jagged_collection::{
    map_partitions, BinaryOp, Collection, DataType, Engine, Error, ExecError, Form, Reducer,
    Scalar, State,
};
use jagged_core::prelude::EngineConfig;
use serde_json::json;
use test_data_gen::points;

fn ints(parts: &[Vec<i64>]) -> Collection {
    let rows: Vec<Vec<serde_json::Value>> = parts
        .iter()
        .map(|p| p.iter().map(|v| json!(v)).collect())
        .collect();
    Collection::from_json("ints", Form::primitive(DataType::Int64), &rows).unwrap()
}

#[test]
fn test_meta_type_matches_computed_type() {
    let (c, _) = points(&[3, 2]);
    let z = c.field("z").unwrap();
    let derived = vec![
        c.clone(),
        z.clone(),
        z.num(1).unwrap(),
        z.flatten(1).unwrap(),
        z.binary_scalar(BinaryOp::Div, Scalar::I64(2)).unwrap(),
        c.field("x").unwrap().binary_scalar(BinaryOp::Lt, Scalar::I64(3)).unwrap(),
        z.sum(Some(1)).unwrap().into_collection().unwrap(),
        z.max(Some(-1)).unwrap().into_collection().unwrap(),
        Collection::zip(&[("x", &c.field("x").unwrap()), ("n", &z.num(1).unwrap())]).unwrap(),
    ];
    for d in derived {
        let out = d.compute().expect("compute failed");
        assert_eq!(out.form(), d.form(), "type drifted for {d:?}");
    }
}

#[test]
fn test_partition_count_mismatch_fails_before_compute() {
    let (three, src) = points(&[1, 1, 1]);
    let (four, _) = points(&[1, 1, 1, 1]);
    let err = three
        .field("x")
        .unwrap()
        .binary(BinaryOp::Add, &four.field("x").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::PartitionAlignment(_)), "got {err}");

    let err = map_partitions("pair", &[&three, &four], None, |a| Ok(a[0].clone())).unwrap_err();
    assert!(matches!(err, Error::PartitionAlignment(_)));
    assert!(src.reads().is_empty());
}

#[test]
fn test_sum_and_count_across_partitions() {
    // Row counts [2, 3, 1], partition sums [10, 20, 5].
    let c = ints(&[vec![4, 6], vec![5, 7, 8], vec![5]]);
    for split_every in [2, 3, 8] {
        let total = c
            .reduce_split(Reducer::Sum, None, split_every)
            .unwrap()
            .into_scalar()
            .unwrap();
        let n = c
            .reduce_split(Reducer::Count, None, split_every)
            .unwrap()
            .into_scalar()
            .unwrap();
        assert_eq!(total.compute().unwrap(), Scalar::I64(35));
        assert_eq!(n.compute().unwrap(), Scalar::I64(6));
    }
    assert_eq!(c.num_rows().unwrap().compute().unwrap(), Scalar::I64(6));
    assert_eq!(
        c.min(None).unwrap().into_scalar().unwrap().compute().unwrap(),
        Scalar::I64(4)
    );
    let positive = c.binary_scalar(BinaryOp::Gt, Scalar::I64(0)).unwrap();
    assert_eq!(
        positive.all(None).unwrap().into_scalar().unwrap().compute().unwrap(),
        Scalar::Bool(true)
    );
    assert_eq!(
        positive.not().unwrap().any(None).unwrap().into_scalar().unwrap().compute().unwrap(),
        Scalar::Bool(false)
    );
}

#[test]
fn test_lazy_scalar_broadcasts_into_collection() {
    let c = ints(&[vec![1, 2], vec![3], vec![6]]);
    let mean = c.mean().unwrap();
    let centered = c.binary_lazy(BinaryOp::Sub, &mean).unwrap();
    assert_eq!(centered.partition_sizes(), c.partition_sizes());
    assert_eq!(centered.form(), &Form::primitive(DataType::Float64));
    assert_eq!(
        centered.compute().unwrap().to_json().unwrap(),
        vec![json!(-2.0), json!(-1.0), json!(0.0), json!(3.0)]
    );
}

#[test]
fn test_ragged_mismatch_surfaces_at_compute() {
    let form = Form::record([
        ("a", Form::list(Form::primitive(DataType::Int64))),
        ("b", Form::list(Form::primitive(DataType::Int64))),
    ]);
    let c = Collection::from_json(
        "ragged",
        form,
        &[
            vec![json!({"a": [1, 2], "b": [3, 4]})],
            vec![json!({"a": [1], "b": [1, 2, 3]})],
        ],
    )
    .unwrap();
    let sum = c
        .field("a")
        .unwrap()
        .binary(BinaryOp::Add, &c.field("b").unwrap())
        .unwrap();

    match sum.compute() {
        Err(ExecError::PartitionCompute { key, partition, source }) => {
            assert_eq!(partition, 1);
            assert_eq!(key, sum.name().as_str());
            assert!(matches!(source, Error::Data(_)));
        }
        other => panic!("expected a partition failure, got {other:?}"),
    }
}

#[test]
fn test_compute_optimizes_once() {
    let (c, _) = points(&[2]);
    let x = c.field("x").unwrap();
    assert_eq!(x.state(), State::Unoptimized);
    let first = x.compute().unwrap();
    assert_eq!(x.state(), State::Optimized);
    assert_eq!(x.compute().unwrap(), first);
}

#[test]
fn test_async_and_sync_engines_agree() {
    let (c, _) = points(&[2, 3, 1, 4]);
    let y = c.field("y").unwrap().binary_scalar(BinaryOp::Mul, Scalar::I64(3)).unwrap();
    let sync = y.compute_with(&Engine::new(EngineConfig::default())).unwrap();

    #[cfg(feature = "async-scheduler")]
    {
        let engine = Engine::new_async(EngineConfig::default()).unwrap();
        assert_eq!(y.compute_with(&engine).unwrap(), sync);
    }
    assert_eq!(sync.len().unwrap(), 10);
}
