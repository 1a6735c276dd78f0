//! Column projection, observed through the sources' read logs.


use std::sync::Arc;

use jagged_collection::{
    Array, BinaryOp, Collection, ColumnSet, DataType, Engine, Form, Scalar,
};
use jagged_core::prelude::{EngineConfig, OptimizationConfig};
use jagged_io::MemorySource;
use test_data_gen::points;

fn cols(names: &[&str]) -> Option<ColumnSet> {
    Some(names.iter().map(|s| s.to_string()).collect())
}

fn unoptimized_engine() -> Engine {
    let mut cfg = EngineConfig::default();
    cfg.optimization = OptimizationConfig {
        enabled: false,
        ..Default::default()
    };
    Engine::new(cfg)
}

#[test]
fn test_projection_reads_only_touched_field() {
    let (c, src) = points(&[2, 3]);
    let x = c.field("x").unwrap();
    let out = x.compute().expect("compute failed");

    assert_eq!(out.len().unwrap(), 5);
    let reads = src.reads();
    assert_eq!(reads.len(), 2);
    assert!(reads.iter().all(|r| r.columns == cols(&["x"])));
}

#[test]
fn test_sibling_branches_read_union_once() {
    let (c, src) = points(&[2, 2, 1]);
    let x = c.field("x").unwrap();
    let y = c.field("y").unwrap();

    let both = x.binary(BinaryOp::Add, &y).unwrap();
    both.compute().expect("compute failed");
    let reads = src.reads();
    assert_eq!(reads.len(), 3, "one read per partition");
    assert!(reads.iter().all(|r| r.columns == cols(&["x", "y"])));

    src.clear_reads();
    let results = Collection::compute_all(&[&x, &y]).expect("compute_all failed");
    assert_eq!(results.len(), 2);
    let mut partitions: Vec<usize> = src.reads().iter().map(|r| r.partition).collect();
    partitions.sort_unstable();
    assert_eq!(partitions, vec![0, 1, 2]);
    assert!(src.reads().iter().all(|r| r.columns == cols(&["x", "y"])));
}

/// `z * 2 + z`, kept where `x >= 2`.
fn filtered_z(c: &Collection) -> Collection {
    let z = c.field("z").unwrap();
    let shifted = z
        .binary_scalar(BinaryOp::Mul, Scalar::F64(2.0))
        .unwrap()
        .binary(BinaryOp::Add, &z)
        .unwrap();
    let big = c
        .field("x")
        .unwrap()
        .binary_scalar(BinaryOp::Ge, Scalar::I64(2))
        .unwrap();
    shifted.filter(&big).unwrap()
}

#[test]
fn test_projection_does_not_change_results() {
    let (c, src) = points(&[3, 1, 2]);
    let optimized = filtered_z(&c).compute().expect("optimized compute failed");
    let projected_reads = src.reads();

    let (fresh, fresh_src) = points(&[3, 1, 2]);
    let plain = filtered_z(&fresh)
        .compute_with(&unoptimized_engine())
        .expect("unoptimized compute failed");

    assert_eq!(optimized, plain);
    assert!(fresh_src.reads().iter().all(|r| r.columns.is_none()));
    let all: ColumnSet = test_data_gen::points_form().columns().into_iter().collect();
    assert_eq!(projected_reads.len(), 3);
    for read in projected_reads {
        let used = read.columns.expect("projection ran");
        assert!(used.is_subset(&all));
        assert_eq!(used, cols(&["x", "z"]).unwrap());
    }
}

#[test]
fn test_engine_settings_are_not_masked_by_cached_graph() {
    let (c, src) = points(&[2, 2]);
    let picked = filtered_z(&c);
    let optimized = picked.compute().expect("optimized compute failed");
    assert!(src.reads().iter().all(|r| r.columns == cols(&["x", "z"])));

    src.clear_reads();
    let plain = picked
        .compute_with(&unoptimized_engine())
        .expect("unoptimized compute failed");
    assert_eq!(optimized, plain);
    assert_eq!(src.reads().len(), 2);
    assert!(src.reads().iter().all(|r| r.columns.is_none()));

    // The cached graph still serves the default settings.
    src.clear_reads();
    picked.compute().expect("optimized compute failed");
    assert!(src.reads().iter().all(|r| r.columns == cols(&["x", "z"])));
}

#[test]
fn test_projection_inside_mapped_function_keeps_its_fields() {
    let (c, src) = points(&[2, 3]);
    let keep_x = c
        .map_partitions("keep-x", None, |a| Ok(a.project(&cols(&["x"]).unwrap())))
        .unwrap();
    // A sibling branch touching `y` shares the source layer.
    let _sibling = c.field("y").unwrap().neg().unwrap();

    let needed = keep_x.necessary_columns().unwrap();
    let read = needed.values().next().cloned().flatten().expect("projectable");
    assert!(read.contains("x"), "read {read:?}");

    let optimized = keep_x.compute().expect("optimized compute failed");
    assert!(src.reads().iter().all(|r| r.columns.as_ref().is_some_and(|s| s.contains("x"))));
    let (fresh, _) = points(&[2, 3]);
    let plain = fresh
        .map_partitions("keep-x", None, |a| Ok(a.project(&cols(&["x"]).unwrap())))
        .unwrap()
        .compute_with(&unoptimized_engine())
        .expect("unoptimized compute failed");
    assert_eq!(optimized, plain);
    assert_eq!(optimized.form(), keep_x.form());
}

#[test]
fn test_unprojectable_source_reads_everything_and_agrees() {
    let rows = test_data_gen::points_rows(&[3, 1, 2]);
    let src = Arc::new(
        MemorySource::from_json("points", test_data_gen::points_form(), &rows)
            .unwrap()
            .without_projection(),
    );
    let c = Collection::from_source(src.clone());
    let out = filtered_z(&c).compute().expect("compute failed");

    let reads = src.reads();
    assert_eq!(reads.len(), 3);
    assert!(reads.iter().all(|r| r.columns.is_none()));

    let (projectable, _) = points(&[3, 1, 2]);
    assert_eq!(out, filtered_z(&projectable).compute().unwrap());
}

#[test]
fn test_optimizing_twice_changes_nothing() {
    let (c, _) = points(&[2, 2]);
    let y = c.field("y").unwrap().neg().unwrap();
    let outputs = [y.name().clone()];
    let cfg = OptimizationConfig::default();

    let once = jagged_planner::optimize(y.graph(), &outputs, &cfg).unwrap();
    let twice = jagged_planner::optimize(&once, &outputs, &cfg).unwrap();
    assert_eq!(once.fingerprint().unwrap(), twice.fingerprint().unwrap());
    assert_eq!(
        jagged_planner::necessary_columns(&once, &outputs).unwrap(),
        jagged_planner::necessary_columns(&twice, &outputs).unwrap()
    );

    let opt = y.optimize().unwrap();
    assert_eq!(opt.meta(), y.meta());
    assert_eq!(opt.partition_sizes(), y.partition_sizes());
}

#[test]
fn test_untouched_input_reads_all_fields() {
    let (c, src) = points(&[2, 1]);
    let ignored = c
        .map_partitions("constant", None, |_| {
            Array::from_json(Form::primitive(DataType::Int64), &[])
        })
        .unwrap();

    let needed = ignored.necessary_columns().unwrap();
    assert_eq!(needed.values().collect::<Vec<_>>(), vec![&None]);
    ignored.compute().expect("compute failed");
    assert!(src.reads().iter().all(|r| r.columns.is_none()));
}

#[test]
fn test_row_count_reads_no_fields() {
    let (c, src) = points(&[2, 3, 1]);
    let n = c.num_rows().unwrap();
    assert_eq!(n.compute().expect("compute failed"), Scalar::I64(6));

    let reads = src.reads();
    assert_eq!(reads.len(), 3);
    assert!(reads.iter().all(|r| r.columns == Some(ColumnSet::new())));
}
