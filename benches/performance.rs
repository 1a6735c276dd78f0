use criterion::{criterion_group, criterion_main, Criterion};
use jagged_collection::{BinaryOp, Collection, DataType, Engine, Form, Scalar};
use serde_json::json;

const FIELDS: usize = 32;

fn wide_form() -> Form {
    Form::record((0..FIELDS).map(|i| (format!("f{i}"), Form::primitive(DataType::Int64))))
}

fn wide_collection(partitions: usize, rows: usize) -> Collection {
    let parts: Vec<Vec<serde_json::Value>> = (0..partitions)
        .map(|p| {
            (0..rows)
                .map(|r| {
                    let obj: serde_json::Map<String, serde_json::Value> = (0..FIELDS)
                        .map(|i| (format!("f{i}"), json!((p * rows + r + i) as i64)))
                        .collect();
                    serde_json::Value::Object(obj)
                })
                .collect()
        })
        .collect();
    Collection::from_json("wide", wide_form(), &parts).unwrap()
}

/// Sum of every even field, one layer per step.
fn trace_sum(c: &Collection) -> Collection {
    let mut acc = c.field("f0").unwrap();
    for i in (2..FIELDS).step_by(2) {
        let f = c.field(&format!("f{i}")).unwrap();
        acc = acc.binary(BinaryOp::Add, &f).unwrap();
    }
    acc.binary_scalar(BinaryOp::Mul, Scalar::I64(2)).unwrap()
}

fn bench_trace_and_optimize(c: &mut Criterion) {
    let wide = wide_collection(16, 4);
    let engine = Engine::default();
    c.bench_function("trace_wide_graph", |b| {
        b.iter(|| {
            let _ = trace_sum(&wide);
        })
    });
    let traced = trace_sum(&wide);
    c.bench_function("optimize_wide_graph", |b| {
        b.iter(|| {
            let _ = engine.optimize(traced.graph(), &[traced.name().clone()]).unwrap();
        })
    });
}

fn bench_compute(c: &mut Criterion) {
    let wide = wide_collection(16, 256);
    let engine = Engine::default();
    let traced = trace_sum(&wide);
    c.bench_function("compute_projected_sum", |b| {
        b.iter(|| {
            let total = traced.sum(None).unwrap().into_scalar().unwrap();
            let _ = total.compute_with(&engine).unwrap();
        })
    });
}

criterion_group!(collections, bench_trace_and_optimize, bench_compute);
criterion_main!(collections);
