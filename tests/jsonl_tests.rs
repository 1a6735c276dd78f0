//! JSON-lines sources driven end to end.


use std::fs;
use std::path::PathBuf;

use jagged_collection::{BinaryOp, Collection, DataType, Error, ExecError, Form, Scalar};
use serde_json::json;
use test_data_gen::create_temp_dir;

fn events_form() -> Form {
    Form::record([
        ("run", Form::primitive(DataType::Int64)),
        (
            "muons",
            Form::list(Form::record([
                ("pt", Form::primitive(DataType::Float64)),
                ("charge", Form::primitive(DataType::Int32)),
            ])),
        ),
        ("label", Form::optional(Form::primitive(DataType::Utf8))),
    ])
}

fn write_partitions(dir: &PathBuf, parts: &[&[serde_json::Value]]) -> Vec<PathBuf> {
    parts
        .iter()
        .enumerate()
        .map(|(i, rows)| {
            let path = dir.join(format!("part-{i}.jsonl"));
            let body: Vec<String> = rows.iter().map(|r| r.to_string()).collect();
            fs::write(&path, body.join("\n") + "\n").expect("Failed to write partition");
            path
        })
        .collect()
}

#[test]
fn test_jsonl_pipeline_end_to_end() {
    let dir = create_temp_dir("jagged-jsonl");
    let paths = write_partitions(
        &dir,
        &[
            &[
                json!({"run": 1, "muons": [{"pt": 20.0, "charge": 1}, {"pt": 5.0, "charge": -1}], "label": "a"}),
                json!({"run": 1, "muons": [], "label": null}),
            ],
            &[json!({"run": 2, "muons": [{"pt": 40.0, "charge": -1}], "label": "b"})],
        ],
    );
    let events = Collection::from_json_lines(events_form(), &paths);
    assert_eq!(events.partition_sizes(), &[None, None]);

    let pt = events.field_path("muons.pt").unwrap();
    let hard = pt.binary_scalar(BinaryOp::Gt, Scalar::F64(10.0)).unwrap();
    let hard_pt = pt.filter(&hard).unwrap();
    let total = hard_pt.sum(None).unwrap().into_scalar().unwrap();
    let n_hard = hard_pt.num(1).unwrap();

    let needed = hard_pt.necessary_columns().unwrap();
    let wanted = Some(["muons.pt".to_string()].into_iter().collect());
    assert_eq!(needed.values().collect::<Vec<_>>(), vec![&wanted]);

    assert_eq!(total.compute().unwrap(), Scalar::F64(60.0));
    assert_eq!(
        n_hard.compute().unwrap().to_json().unwrap(),
        vec![json!(1), json!(0), json!(1)]
    );

    let sized = events.with_computed_sizes().unwrap();
    assert_eq!(sized.partition_sizes(), &[Some(2), Some(1)]);
    assert_eq!(sized.known_len(), Some(3));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_malformed_partition_names_partition() {
    let dir = create_temp_dir("jagged-jsonl-bad");
    let paths = write_partitions(
        &dir,
        &[
            &[json!({"run": 1, "muons": [], "label": null})],
            &[json!({"run": "not a number", "muons": [], "label": null})],
        ],
    );
    let runs = Collection::from_json_lines(events_form(), &paths)
        .field("run")
        .unwrap();

    match runs.compute() {
        Err(ExecError::PartitionCompute { partition, source, .. }) => {
            assert_eq!(partition, 1);
            assert!(matches!(source, Error::Data(_) | Error::Source(_)), "got {source}");
        }
        other => panic!("expected a partition failure, got {other:?}"),
    }

    let _ = fs::remove_dir_all(&dir);
}
