//! Reductions within a partition, and the partial/combine pair used to
//! reduce across partitions.
//!
//! Cross-partition reductions run `partial` on every partition and fold the
//! partials with `combine` using the reducer's combiner:
//!
//! | reducer | partial           | combiner |
//! |---------|-------------------|----------|
//! | sum     | sum               | sum      |
//! | count   | non-null count    | sum      |
//! | min     | min (null if none)| min      |
//! | max     | max (null if none)| max      |
//! | any     | or                | any      |
//! | all     | and               | all      |
//!
//! Every combiner is associative and commutative, so partials may be merged
//! in any grouping and order.

use std::cmp::Ordering;

use jagged_core::types::scalar_cmp;
use jagged_core::{DataType, Error, Form, Result, Scalar, Value};
use serde::{Deserialize, Serialize};

use crate::array::{Array, Datum, TypedScalar};
use crate::lineage::Lineage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Count,
    Min,
    Max,
    Any,
    All,
}

impl Reducer {
    pub fn name(self) -> &'static str {
        match self {
            Reducer::Sum => "sum",
            Reducer::Count => "count",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Any => "any",
            Reducer::All => "all",
        }
    }

    /// Reducer that merges partial results of `self`.
    pub fn combiner(self) -> Reducer {
        match self {
            Reducer::Count => Reducer::Sum,
            other => other,
        }
    }

    pub fn output_dtype(self, input: DataType) -> Result<DataType> {
        use DataType::*;
        match (self, input) {
            (Reducer::Count, _) => Ok(Int64),
            (Reducer::Min | Reducer::Max, d) => Ok(d),
            (_, Utf8) => Err(Error::TypeMismatch(format!(
                "cannot {} values of type {input}",
                self.name()
            ))),
            (Reducer::Sum, Boolean | Int32 | Int64) => Ok(Int64),
            (Reducer::Sum, d) => Ok(d),
            (Reducer::Any | Reducer::All, _) => Ok(Boolean),
        }
    }

    /// Form of one reduced value: min/max are missing for empty input.
    pub fn output_form(self, input: DataType) -> Result<Form> {
        let prim = Form::primitive(self.output_dtype(input)?);
        Ok(match self {
            Reducer::Min | Reducer::Max => Form::optional(prim),
            _ => prim,
        })
    }

    fn identity(self, out: DataType) -> Scalar {
        match self {
            Reducer::Sum => match out {
                DataType::Float32 => Scalar::F32(0.0),
                DataType::Float64 => Scalar::F64(0.0),
                _ => Scalar::I64(0),
            },
            Reducer::Count => Scalar::I64(0),
            Reducer::Min | Reducer::Max => Scalar::Null,
            Reducer::Any => Scalar::Bool(false),
            Reducer::All => Scalar::Bool(true),
        }
    }
}

/// Fold leaf scalars, skipping missing values.
fn fold_leaves<'a, I>(reducer: Reducer, items: I, out: DataType) -> Result<Scalar>
where
    I: IntoIterator<Item = &'a Scalar>,
{
    let present = items.into_iter().filter(|s| !s.is_null());
    let bad = |s: &Scalar| Error::Data(format!("cannot {} {s:?}", reducer.name()));
    match reducer {
        Reducer::Count => Ok(Scalar::I64(present.count() as i64)),
        Reducer::Sum if out.is_float() => {
            let mut acc = 0.0f64;
            for s in present {
                acc += s.as_f64().ok_or_else(|| bad(s))?;
            }
            Scalar::F64(acc).cast(out)
        }
        Reducer::Sum => {
            let mut acc = 0i64;
            for s in present {
                acc = acc.wrapping_add(s.as_i64().ok_or_else(|| bad(s))?);
            }
            Scalar::I64(acc).cast(out)
        }
        Reducer::Min | Reducer::Max => {
            let want = if reducer == Reducer::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Scalar> = None;
            for s in present {
                best = match best {
                    Some(b) if scalar_cmp(s, b) != want => Some(b),
                    _ => Some(s),
                };
            }
            Ok(best.cloned().unwrap_or_else(|| reducer.identity(out)))
        }
        Reducer::Any | Reducer::All => {
            let mut acc = reducer == Reducer::All;
            for s in present {
                let t = s.truthy().ok_or_else(|| bad(s))?;
                acc = if reducer == Reducer::Any { acc || t } else { acc && t };
            }
            Ok(Scalar::Bool(acc))
        }
    }
}

fn collect_leaves<'a>(v: &'a Value, out: &mut Vec<&'a Scalar>) -> Result<()> {
    match v {
        Value::Scalar(s) => out.push(s),
        Value::List(items) => {
            for i in items {
                collect_leaves(i, out)?;
            }
        }
        Value::Record(_) => return Err(Error::Data("cannot reduce a record".into())),
    }
    Ok(())
}

/// Reduce `items` position by position; `depth` is the number of list
/// levels below each item.
fn positionwise(reducer: Reducer, items: &[&Value], depth: usize, out: DataType) -> Result<Value> {
    let present: Vec<&Value> = items.iter().copied().filter(|v| !v.is_null()).collect();
    if depth == 0 {
        let scalars = present
            .iter()
            .map(|v| {
                v.as_scalar()
                    .ok_or_else(|| Error::Data(format!("expected a scalar, found {v:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        return fold_leaves(reducer, scalars, out).map(Value::Scalar);
    }
    let lists = present
        .iter()
        .map(|v| {
            v.as_list()
                .ok_or_else(|| Error::Data(format!("expected a list, found {v:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let width = lists.iter().map(|l| l.len()).max().unwrap_or(0);
    (0..width)
        .map(|p| {
            let column: Vec<&Value> = lists.iter().filter_map(|l| l.get(p)).collect();
            positionwise(reducer, &column, depth - 1, out)
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::List)
}

fn reduce_in(reducer: Reducer, v: &Value, j: usize, depth: usize, out: DataType) -> Result<Value> {
    match v {
        v if v.is_null() => Ok(Value::NULL),
        Value::List(items) if j == 0 => {
            let refs: Vec<&Value> = items.iter().collect();
            positionwise(reducer, &refs, depth, out)
        }
        Value::List(items) => items
            .iter()
            .map(|i| reduce_in(reducer, i, j - 1, depth, out))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        other => Err(Error::Data(format!("expected a list, found {other:?}"))),
    }
}

fn replace_leaf(form: &Form, leaf: &Form) -> Form {
    match form {
        Form::Primitive { .. } => leaf.clone(),
        Form::Optional { content } => Form::optional(replace_leaf(content, leaf)),
        Form::List { content } => Form::list(replace_leaf(content, leaf)),
        other => other.clone(),
    }
}

fn remove_level(form: &Form, level: usize) -> Result<Form> {
    match form {
        Form::Optional { content } => Ok(Form::optional(remove_level(content, level)?)),
        Form::List { content } if level == 0 => Ok(content.as_ref().clone()),
        Form::List { content } => Ok(Form::list(remove_level(content, level - 1)?)),
        other => Err(Error::Invariant(format!("no list level {level} in {other}"))),
    }
}

/// Shape facts every reduction needs.
struct Plan {
    depth: usize,
    out_dtype: DataType,
    out_leaf: Form,
    axis: Option<usize>,
}

fn plan(form: &Form, reducer: Reducer, axis: Option<i64>) -> Result<Plan> {
    let depth = form.list_depth().ok_or_else(|| {
        Error::TypeMismatch(format!(
            "cannot {} {form}: records and unions have no reduction",
            reducer.name()
        ))
    })?;
    let leaf = form
        .leaf_dtype()
        .ok_or_else(|| Error::Invariant(format!("no leaf type in {form}")))?;
    let ndim = depth as i64 + 1;
    let axis = match axis {
        None => None,
        Some(a) if a >= -ndim && a < ndim => {
            let k = if a < 0 { a + ndim } else { a };
            Some(k as usize)
        }
        Some(a) => {
            return Err(Error::InvalidValue(format!(
                "axis={a} is out of range for {form} ({ndim} dimension(s))"
            )))
        }
    };
    Ok(Plan {
        depth,
        out_dtype: reducer.output_dtype(leaf)?,
        out_leaf: reducer.output_form(leaf)?,
        axis,
    })
}

/// Reduce within one partition. `axis = None` reduces everything to a
/// scalar; axis 0 reduces across rows; deeper axes reduce inside each row.
pub fn reduce(input: &Datum, reducer: Reducer, axis: Option<i64>) -> Result<Datum> {
    let array = match input {
        Datum::Array(a) => a,
        Datum::Scalar(s) => return reduce_scalar(s, reducer),
    };
    let p = plan(array.form(), reducer, axis)?;

    match p.axis {
        None => {
            if array.is_typetracer() {
                array.touch_data();
                return Ok(Datum::Scalar(TypedScalar::unknown(p.out_leaf)));
            }
            let mut leaves = Vec::new();
            for row in array.rows()? {
                collect_leaves(row, &mut leaves)?;
            }
            let s = fold_leaves(reducer, leaves, p.out_dtype)?;
            TypedScalar::known(p.out_leaf, s).map(Datum::Scalar)
        }
        Some(0) if p.depth == 0 => {
            if array.is_typetracer() {
                array.touch_data();
                return Ok(Datum::Scalar(TypedScalar::unknown(p.out_leaf)));
            }
            let refs: Vec<&Value> = array.rows()?.iter().collect();
            match positionwise(reducer, &refs, 0, p.out_dtype)? {
                Value::Scalar(s) => TypedScalar::known(p.out_leaf, s).map(Datum::Scalar),
                other => Err(Error::Invariant(format!("expected a scalar, found {other:?}"))),
            }
        }
        Some(0) => {
            let form = replace_leaf(&remove_level(array.form(), 0)?, &p.out_leaf);
            if array.is_typetracer() {
                array.touch_data();
                return Ok(Datum::Array(Array::tracer(form, None, Lineage::untracked())));
            }
            let refs: Vec<&Value> = array.rows()?.iter().collect();
            match positionwise(reducer, &refs, p.depth, p.out_dtype)? {
                Value::List(rows) => Ok(Datum::Array(Array::from_rows_unchecked(form, rows))),
                other => Err(Error::Invariant(format!("expected rows, found {other:?}"))),
            }
        }
        Some(k) => {
            let form = replace_leaf(&remove_level(array.form(), k - 1)?, &p.out_leaf);
            if array.is_typetracer() {
                array.touch_data();
                return Ok(Datum::Array(Array::tracer(
                    form,
                    array.known_len(),
                    Lineage::untracked(),
                )));
            }
            let rows = array
                .rows()?
                .iter()
                .map(|r| reduce_in(reducer, r, k - 1, p.depth - k, p.out_dtype))
                .collect::<Result<Vec<_>>>()?;
            Ok(Datum::Array(Array::from_rows_unchecked(form, rows)))
        }
    }
}

fn reduce_scalar(s: &TypedScalar, reducer: Reducer) -> Result<Datum> {
    let leaf = s
        .form()
        .leaf_dtype()
        .ok_or_else(|| Error::Invariant(format!("scalar of type {}", s.form())))?;
    let out_form = reducer.output_form(leaf)?;
    if s.is_typetracer() {
        return Ok(Datum::Scalar(TypedScalar::unknown(out_form)));
    }
    let v = fold_leaves(reducer, [s.value()?], reducer.output_dtype(leaf)?)?;
    TypedScalar::known(out_form, v).map(Datum::Scalar)
}

/// Which part of the input a cross-partition reduction folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceAxis {
    /// Everything, down to one scalar.
    All,
    /// Across rows (axis 0).
    Rows,
}

impl ReduceAxis {
    fn as_axis(self) -> Option<i64> {
        match self {
            ReduceAxis::All => None,
            ReduceAxis::Rows => Some(0),
        }
    }
}

/// Per-partition partial result.
pub fn partial(input: &Datum, reducer: Reducer, axis: ReduceAxis) -> Result<Datum> {
    reduce(input, reducer, axis.as_axis())
}

/// Merge partials from any subset of partitions, in any order.
pub fn combine(partials: &[Datum], reducer: Reducer) -> Result<Datum> {
    let first = partials
        .first()
        .ok_or_else(|| Error::Invariant("combine needs at least one partial".into()))?;
    if let Some(bad) = partials.iter().find(|p| !p.same_type(first)) {
        return Err(Error::Invariant(format!(
            "partials disagree on type: {} vs {}",
            first.form(),
            bad.form()
        )));
    }
    if partials.iter().any(Datum::is_typetracer) {
        return Ok(first.to_typetracer());
    }
    let combiner = reducer.combiner();
    let dtype = first
        .form()
        .leaf_dtype()
        .ok_or_else(|| Error::Invariant(format!("partial of type {}", first.form())))?;
    let out = combiner.output_dtype(dtype)?;

    match first {
        Datum::Scalar(s) => {
            let values = partials
                .iter()
                .map(|p| match p {
                    Datum::Scalar(s) => s.value(),
                    Datum::Array(_) => Err(Error::Invariant("mixed partials".into())),
                })
                .collect::<Result<Vec<_>>>()?;
            let v = fold_leaves(combiner, values, out)?;
            TypedScalar::known(s.form().clone(), v).map(Datum::Scalar)
        }
        Datum::Array(a) => {
            let depth = a
                .form()
                .list_depth()
                .ok_or_else(|| Error::Invariant(format!("partial of type {}", a.form())))?;
            let lists = partials
                .iter()
                .map(|p| Ok(Value::List(p.as_array()?.rows()?.to_vec())))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Value> = lists.iter().collect();
            match positionwise(combiner, &refs, depth + 1, out)? {
                Value::List(rows) => Ok(Datum::Array(Array::from_rows_unchecked(
                    a.form().clone(),
                    rows,
                ))),
                other => Err(Error::Invariant(format!("expected rows, found {other:?}"))),
            }
        }
    }
}
