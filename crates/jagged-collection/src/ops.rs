//! Array operations lifted to collections: each one traces the operation on
//! the input metas and appends a single blockwise layer.

use jagged_core::{Error, LayerName, Result, Scalar};
use jagged_graph::{LayerArg, PartitionFn};
use jagged_tracer::{BinaryOp, Datum, Op, UnaryOp};

use crate::collection::{check_aligned, joint_sizes, Collection};
use crate::scalar::LazyScalar;

/// Whether an operation preserves per-partition row counts.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Sizes {
    Keep,
    Unknown,
}

fn apply_op(
    op: Op,
    inputs: &[&Collection],
    scalars: &[&LazyScalar],
    sizes: Sizes,
) -> Result<Collection> {
    check_aligned(inputs)?;
    let mut metas: Vec<Datum> = inputs.iter().map(|c| Datum::Array(c.meta.clone())).collect();
    metas.extend(scalars.iter().map(|s| Datum::Scalar(s.meta.clone())));
    let meta = op.apply(&metas)?.into_array()?;

    let sizes = match sizes {
        Sizes::Keep => joint_sizes(inputs),
        Sizes::Unknown => vec![None; inputs.first().map_or(0, |c| c.npartitions())],
    };
    let extra: Vec<_> = scalars
        .iter()
        .map(|s| (s.graph.as_ref(), LayerArg::Broadcast(s.name.clone())))
        .collect();
    Ok(Collection::blockwise(
        inputs,
        &extra,
        LayerName::fresh(op.name()),
        PartitionFn::op(op),
        meta,
        sizes,
    ))
}

impl Collection {
    /// A record field, looking through lists and options.
    pub fn field(&self, name: &str) -> Result<Collection> {
        apply_op(Op::Field(name.to_string()), &[self], &[], Sizes::Keep)
    }

    /// Dotted field path, one layer per step.
    pub fn field_path(&self, path: &str) -> Result<Collection> {
        let mut steps = path.split('.').filter(|s| !s.is_empty());
        let first = steps
            .next()
            .ok_or_else(|| Error::InvalidValue("empty field path".into()))?;
        steps.try_fold(self.field(first)?, |c, step| c.field(step))
    }

    /// Elementwise `self op other`; both must be partitioned alike.
    pub fn binary(&self, op: BinaryOp, other: &Collection) -> Result<Collection> {
        apply_op(Op::Binary(op), &[self, other], &[], Sizes::Keep)
    }

    pub fn binary_scalar(&self, op: BinaryOp, value: Scalar) -> Result<Collection> {
        apply_op(Op::BinaryScalar(op, value), &[self], &[], Sizes::Keep)
    }

    /// Elementwise `self op value` where `value` is computed lazily; its
    /// result is broadcast to every partition.
    pub fn binary_lazy(&self, op: BinaryOp, value: &LazyScalar) -> Result<Collection> {
        apply_op(Op::Binary(op), &[self], &[value], Sizes::Keep)
    }

    pub fn neg(&self) -> Result<Collection> {
        apply_op(Op::Unary(UnaryOp::Neg), &[self], &[], Sizes::Keep)
    }

    pub fn not(&self) -> Result<Collection> {
        apply_op(Op::Unary(UnaryOp::Not), &[self], &[], Sizes::Keep)
    }

    /// Combine aligned collections into one collection of records.
    pub fn zip(fields: &[(&str, &Collection)]) -> Result<Collection> {
        if fields.is_empty() {
            return Err(Error::InvalidValue("zip needs at least one field".into()));
        }
        let names = fields.iter().map(|(n, _)| n.to_string()).collect();
        let inputs: Vec<&Collection> = fields.iter().map(|(_, c)| *c).collect();
        apply_op(Op::Record(names), &inputs, &[], Sizes::Keep)
    }

    /// List lengths at `axis` (>= 1, or negative from the innermost level).
    pub fn num(&self, axis: i64) -> Result<Collection> {
        apply_op(Op::Num(axis), &[self], &[], Sizes::Keep)
    }

    /// Remove one level of nesting. Flattening into the rows themselves
    /// makes partition sizes unknown.
    pub fn flatten(&self, axis: i64) -> Result<Collection> {
        let depth = self.form().list_depth().unwrap_or(0) as i64;
        let resolved = if axis < 0 { depth + 1 + axis } else { axis };
        let sizes = if resolved == 1 { Sizes::Unknown } else { Sizes::Keep };
        apply_op(Op::Flatten(axis), &[self], &[], sizes)
    }

    /// Keep rows (or nested items, for a nested mask) where `mask` is true.
    pub fn filter(&self, mask: &Collection) -> Result<Collection> {
        let nested = mask.form().unwrap_optional().list_depth().unwrap_or(0) > 0;
        let sizes = if nested { Sizes::Keep } else { Sizes::Unknown };
        apply_op(Op::Filter, &[self, mask], &[], sizes)
    }

    pub fn is_none(&self) -> Result<Collection> {
        apply_op(Op::IsNone, &[self], &[], Sizes::Keep)
    }

    pub fn fill_none(&self, value: Scalar) -> Result<Collection> {
        apply_op(Op::FillNone(value), &[self], &[], Sizes::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jagged_core::{DataType, Form};
    use serde_json::json;

    fn events() -> Collection {
        let form = Form::record([
            ("id", Form::primitive(DataType::Int64)),
            (
                "hits",
                Form::list(Form::record([
                    ("e", Form::primitive(DataType::Float64)),
                    ("tag", Form::primitive(DataType::Utf8)),
                ])),
            ),
            ("note", Form::optional(Form::primitive(DataType::Utf8))),
        ]);
        Collection::from_json(
            "events",
            form,
            &[
                vec![
                    json!({"id": 1, "hits": [{"e": 1.5, "tag": "a"}, {"e": 2.0, "tag": "b"}], "note": "x"}),
                    json!({"id": 2, "hits": [], "note": null}),
                ],
                vec![json!({"id": 3, "hits": [{"e": 0.5, "tag": "c"}], "note": null})],
            ],
        )
        .unwrap()
    }

    #[test]
    fn field_path_reaches_nested_leaves() {
        let e = events().field_path("hits.e").unwrap();
        assert_eq!(e.form().to_string(), "var * float64");
        assert_eq!(e.partition_sizes(), &[Some(2), Some(1)]);
        assert_eq!(
            e.compute().unwrap().to_json().unwrap(),
            vec![json!([1.5, 2.0]), json!([]), json!([0.5])]
        );
        assert!(events().field_path("").is_err());
    }

    #[test]
    fn unknown_field_fails_while_building() {
        let err = events().field("missing").unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_) | Error::TypeMismatch(_)));
    }

    #[test]
    fn row_filter_forgets_sizes_nested_filter_keeps_them() {
        let ev = events();
        let big = ev.field("id").unwrap().binary_scalar(BinaryOp::Gt, Scalar::I64(1)).unwrap();
        let rows = ev.filter(&big).unwrap();
        assert_eq!(rows.partition_sizes(), &[None, None]);
        assert_eq!(rows.field("id").unwrap().compute().unwrap().to_json().unwrap(), vec![json!(2), json!(3)]);

        let e = ev.field_path("hits.e").unwrap();
        let hot = e.binary_scalar(BinaryOp::Ge, Scalar::F64(1.0)).unwrap();
        let kept = e.filter(&hot).unwrap();
        assert_eq!(kept.partition_sizes(), &[Some(2), Some(1)]);
        assert_eq!(
            kept.compute().unwrap().to_json().unwrap(),
            vec![json!([1.5, 2.0]), json!([]), json!([])]
        );
    }

    #[test]
    fn flatten_rows_and_num() {
        let e = events().field_path("hits.e").unwrap();
        let flat = e.flatten(1).unwrap();
        assert_eq!(flat.partition_sizes(), &[None, None]);
        assert_eq!(
            flat.compute().unwrap().to_json().unwrap(),
            vec![json!(1.5), json!(2.0), json!(0.5)]
        );
        let counts = events().field("hits").unwrap().num(1).unwrap();
        assert_eq!(counts.compute().unwrap().to_json().unwrap(), vec![json!(2), json!(0), json!(1)]);
    }

    #[test]
    fn missing_values_and_zip() {
        let ev = events();
        let note = ev.field("note").unwrap();
        assert_eq!(
            note.is_none().unwrap().compute().unwrap().to_json().unwrap(),
            vec![json!(false), json!(true), json!(true)]
        );
        let filled = note.fill_none(Scalar::Str("-".into())).unwrap();
        let zipped = Collection::zip(&[("id", &ev.field("id").unwrap()), ("note", &filled)]).unwrap();
        assert_eq!(
            zipped.compute().unwrap().to_json().unwrap(),
            vec![
                json!({"id": 1, "note": "x"}),
                json!({"id": 2, "note": "-"}),
                json!({"id": 3, "note": "-"})
            ]
        );
    }

    #[test]
    fn unary_ops() {
        let ids = events().field("id").unwrap();
        assert_eq!(
            ids.neg().unwrap().compute().unwrap().to_json().unwrap(),
            vec![json!(-1), json!(-2), json!(-3)]
        );
        let odd = ids.binary_scalar(BinaryOp::Eq, Scalar::I64(2)).unwrap().not().unwrap();
        assert_eq!(odd.compute().unwrap().to_json().unwrap(), vec![json!(true), json!(false), json!(true)]);
    }

    #[test]
    fn misaligned_inputs_are_rejected() {
        let a = events().field("id").unwrap();
        let b = Collection::from_json(
            "other",
            Form::primitive(DataType::Int64),
            &[vec![json!(1)], vec![json!(2)], vec![json!(3)]],
        )
        .unwrap();
        assert!(matches!(a.binary(BinaryOp::Add, &b), Err(Error::PartitionAlignment(_))));
        let c = Collection::from_json(
            "short",
            Form::primitive(DataType::Int64),
            &[vec![json!(1)], vec![json!(2)]],
        )
        .unwrap();
        assert!(matches!(a.binary(BinaryOp::Add, &c), Err(Error::PartitionAlignment(_))));
    }
}
