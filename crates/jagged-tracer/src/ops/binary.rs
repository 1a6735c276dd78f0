//! Elementwise arithmetic, comparison and logic with ragged broadcasting.

use jagged_core::{DataType, Error, Form, Result, Scalar, Value};
use serde::{Deserialize, Serialize};

use crate::array::{Array, Datum, TypedScalar};
use crate::lineage::Lineage;

use super::joint_length;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Result dtype of `l op r`.
pub fn promote(op: BinaryOp, l: DataType, r: DataType) -> Result<DataType> {
    use DataType::*;

    let mismatch = || {
        Error::TypeMismatch(format!(
            "no '{}' operation between {l} and {r}",
            op.symbol()
        ))
    };
    let narrow_float = |t: DataType| matches!(t, Float32 | Boolean);
    let narrow_int = |t: DataType| matches!(t, Int32 | Boolean);

    if op.is_logical() {
        return if l == Boolean && r == Boolean {
            Ok(Boolean)
        } else {
            Err(mismatch())
        };
    }
    if op.is_comparison() {
        return match (l, r) {
            (Utf8, Utf8) => Ok(Boolean),
            (Utf8, _) | (_, Utf8) => Err(mismatch()),
            _ => Ok(Boolean),
        };
    }
    if l == Utf8 || r == Utf8 {
        return Err(mismatch());
    }
    if op == BinaryOp::Div {
        let both_bool = l == Boolean && r == Boolean;
        return Ok(if narrow_float(l) && narrow_float(r) && !both_bool {
            Float32
        } else {
            Float64
        });
    }
    Ok(match (l, r) {
        (Boolean, Boolean) => Int64,
        _ if l.is_float() || r.is_float() => {
            if narrow_float(l) && narrow_float(r) {
                Float32
            } else {
                Float64
            }
        }
        _ if narrow_int(l) && narrow_int(r) => Int32,
        _ => Int64,
    })
}

/// Result form of `l op r`, broadcasting primitives into lists and zipping
/// lists with lists.
pub fn binary_form(op: BinaryOp, l: &Form, r: &Form) -> Result<Form> {
    match (l, r) {
        (Form::Optional { content }, _) => Ok(Form::optional(binary_form(op, content, r)?)),
        (_, Form::Optional { content }) => Ok(Form::optional(binary_form(op, l, content)?)),
        (Form::List { content: a }, Form::List { content: b }) => {
            Ok(Form::list(binary_form(op, a, b)?))
        }
        (Form::List { content }, Form::Primitive { .. }) => Ok(Form::list(binary_form(op, content, r)?)),
        (Form::Primitive { .. }, Form::List { content }) => Ok(Form::list(binary_form(op, l, content)?)),
        (Form::Primitive { dtype: a }, Form::Primitive { dtype: b }) => {
            Ok(Form::primitive(promote(op, *a, *b)?))
        }
        _ => Err(Error::TypeMismatch(format!(
            "cannot apply '{}' to {l} and {r}",
            op.symbol()
        ))),
    }
}

pub fn binary(op: BinaryOp, left: &Datum, right: &Datum) -> Result<Datum> {
    let form = binary_form(op, left.form(), right.form())?;
    let tracing = left.is_typetracer() || right.is_typetracer();

    match (left, right) {
        (Datum::Scalar(a), Datum::Scalar(b)) => {
            if tracing {
                return Ok(Datum::Scalar(TypedScalar::unknown(form)));
            }
            let v = binary_value(
                op,
                a.form(),
                &Value::Scalar(a.value()?.clone()),
                b.form(),
                &Value::Scalar(b.value()?.clone()),
            )?;
            match v {
                Value::Scalar(s) => TypedScalar::known(form, s).map(Datum::Scalar),
                other => Err(Error::Invariant(format!("scalar operation produced {other:?}"))),
            }
        }
        _ => {
            let arrays: Vec<&Array> = [left, right]
                .into_iter()
                .filter_map(|d| match d {
                    Datum::Array(a) => Some(a),
                    Datum::Scalar(_) => None,
                })
                .collect();
            let length = joint_length(&arrays)?;
            if tracing {
                left.touch_data();
                right.touch_data();
                return Ok(Datum::Array(Array::tracer(form, length, Lineage::untracked())));
            }
            let n = length.unwrap_or(0);
            let rows = (0..n)
                .map(|i| {
                    let lv = row_or_scalar(left, i)?;
                    let rv = row_or_scalar(right, i)?;
                    binary_value(op, left.form(), &lv, right.form(), &rv)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Datum::Array(Array::from_rows_unchecked(form, rows)))
        }
    }
}

fn row_or_scalar(d: &Datum, i: usize) -> Result<Value> {
    match d {
        Datum::Array(a) => Ok(a.rows()?[i].clone()),
        Datum::Scalar(s) => Ok(Value::Scalar(s.value()?.clone())),
    }
}

fn binary_value(op: BinaryOp, lf: &Form, lv: &Value, rf: &Form, rv: &Value) -> Result<Value> {
    if lv.is_null() || rv.is_null() {
        return Ok(Value::NULL);
    }
    match (lf.unwrap_optional(), rf.unwrap_optional(), lv, rv) {
        (Form::List { content: a }, Form::List { content: b }, Value::List(xs), Value::List(ys)) => {
            if xs.len() != ys.len() {
                return Err(Error::Data(format!(
                    "cannot broadcast nested lists of length {} and {}",
                    xs.len(),
                    ys.len()
                )));
            }
            xs.iter()
                .zip(ys)
                .map(|(x, y)| binary_value(op, a, x, b, y))
                .collect::<Result<Vec<_>>>()
                .map(Value::List)
        }
        (Form::List { content }, Form::Primitive { .. }, Value::List(xs), _) => xs
            .iter()
            .map(|x| binary_value(op, content, x, rf, rv))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        (Form::Primitive { .. }, Form::List { content }, _, Value::List(ys)) => ys
            .iter()
            .map(|y| binary_value(op, lf, lv, content, y))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        (
            Form::Primitive { dtype: a },
            Form::Primitive { dtype: b },
            Value::Scalar(x),
            Value::Scalar(y),
        ) => scalar_binary(op, x, y, promote(op, *a, *b)?).map(Value::Scalar),
        _ => Err(Error::Data(format!(
            "values {lv:?} and {rv:?} do not match {lf} and {rf}"
        ))),
    }
}

fn scalar_binary(op: BinaryOp, x: &Scalar, y: &Scalar, out: DataType) -> Result<Scalar> {
    use std::cmp::Ordering;

    let bad = || Error::Data(format!("cannot apply '{}' to {x:?} and {y:?}", op.symbol()));

    if op.is_logical() {
        let (a, b) = match (x, y) {
            (Scalar::Bool(a), Scalar::Bool(b)) => (*a, *b),
            _ => return Err(bad()),
        };
        return Ok(Scalar::Bool(if op == BinaryOp::And { a && b } else { a || b }));
    }

    if op.is_comparison() {
        let ord = match (x, y) {
            (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
            _ if x.data_type().is_some_and(DataType::is_float)
                || y.data_type().is_some_and(DataType::is_float) =>
            {
                let a = x.as_f64().ok_or_else(bad)?;
                let b = y.as_f64().ok_or_else(bad)?;
                a.partial_cmp(&b)
            }
            _ => Some(x.as_i64().ok_or_else(bad)?.cmp(&y.as_i64().ok_or_else(bad)?)),
        };
        let r = match (op, ord) {
            (BinaryOp::Ne, None) => true,
            (_, None) => false,
            (BinaryOp::Eq, Some(o)) => o == Ordering::Equal,
            (BinaryOp::Ne, Some(o)) => o != Ordering::Equal,
            (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
            (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
            (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
            (BinaryOp::Ge, Some(o)) => o != Ordering::Less,
            _ => return Err(bad()),
        };
        return Ok(Scalar::Bool(r));
    }

    if out.is_float() {
        let a = x.as_f64().ok_or_else(bad)?;
        let b = y.as_f64().ok_or_else(bad)?;
        let v = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => return Err(bad()),
        };
        return Scalar::F64(v).cast(out);
    }

    let a = x.as_i64().ok_or_else(bad)?;
    let b = y.as_i64().ok_or_else(bad)?;
    let v = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        _ => return Err(bad()),
    };
    Scalar::I64(v).cast(out)
}

pub fn unary_form(op: UnaryOp, form: &Form) -> Result<Form> {
    match form {
        Form::Optional { content } => Ok(Form::optional(unary_form(op, content)?)),
        Form::List { content } => Ok(Form::list(unary_form(op, content)?)),
        Form::Primitive { dtype } => match (op, dtype) {
            (UnaryOp::Neg, d) if d.is_integer() || d.is_float() => Ok(form.clone()),
            (UnaryOp::Not, DataType::Boolean) => Ok(form.clone()),
            _ => Err(Error::TypeMismatch(format!("no {op:?} operation for {dtype}"))),
        },
        _ => Err(Error::TypeMismatch(format!("no {op:?} operation for {form}"))),
    }
}

pub fn unary(op: UnaryOp, operand: &Datum) -> Result<Datum> {
    let form = unary_form(op, operand.form())?;
    match operand {
        Datum::Scalar(s) => {
            if s.is_typetracer() {
                return Ok(Datum::Scalar(TypedScalar::unknown(form)));
            }
            match unary_value(op, &Value::Scalar(s.value()?.clone()))? {
                Value::Scalar(v) => TypedScalar::known(form, v).map(Datum::Scalar),
                other => Err(Error::Invariant(format!("scalar operation produced {other:?}"))),
            }
        }
        Datum::Array(a) => {
            if a.is_typetracer() {
                a.touch_data();
                return Ok(Datum::Array(Array::tracer(form, a.known_len(), Lineage::untracked())));
            }
            let rows = a
                .rows()?
                .iter()
                .map(|v| unary_value(op, v))
                .collect::<Result<Vec<_>>>()?;
            Ok(Datum::Array(Array::from_rows_unchecked(form, rows)))
        }
    }
}

fn unary_value(op: UnaryOp, v: &Value) -> Result<Value> {
    Ok(match v {
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|i| unary_value(op, i))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Scalar(s) => Value::Scalar(match (op, s) {
            (_, Scalar::Null) => Scalar::Null,
            (UnaryOp::Neg, Scalar::I32(x)) => Scalar::I32(x.wrapping_neg()),
            (UnaryOp::Neg, Scalar::I64(x)) => Scalar::I64(x.wrapping_neg()),
            (UnaryOp::Neg, Scalar::F32(x)) => Scalar::F32(-x),
            (UnaryOp::Neg, Scalar::F64(x)) => Scalar::F64(-x),
            (UnaryOp::Not, Scalar::Bool(b)) => Scalar::Bool(!b),
            _ => return Err(Error::Data(format!("no {op:?} operation for {s:?}"))),
        }),
        Value::Record(_) => {
            return Err(Error::Data(format!("no {op:?} operation for a record")));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Report;
    use serde_json::json;

    fn ints() -> Form {
        Form::list(Form::primitive(DataType::Int32))
    }

    #[test]
    fn promotion_table() {
        use DataType::*;
        assert_eq!(promote(BinaryOp::Add, Boolean, Boolean).unwrap(), Int64);
        assert_eq!(promote(BinaryOp::Add, Int32, Boolean).unwrap(), Int32);
        assert_eq!(promote(BinaryOp::Add, Int32, Int64).unwrap(), Int64);
        assert_eq!(promote(BinaryOp::Mul, Float32, Int32).unwrap(), Float64);
        assert_eq!(promote(BinaryOp::Sub, Float32, Float32).unwrap(), Float32);
        assert_eq!(promote(BinaryOp::Div, Int64, Int64).unwrap(), Float64);
        assert_eq!(promote(BinaryOp::Lt, Utf8, Utf8).unwrap(), Boolean);
        assert!(promote(BinaryOp::Add, Utf8, Int64).is_err());
        assert!(promote(BinaryOp::And, Int64, Boolean).is_err());
    }

    #[test]
    fn records_do_not_add() {
        let rec = Form::record([("x", Form::primitive(DataType::Int64))]);
        let err = binary_form(BinaryOp::Add, &rec, &rec).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn ragged_broadcast_matches_tracer_form() {
        let a = Array::from_json(ints(), &[json!([1, 2]), json!([]), json!([5])]).unwrap();
        let real = a.binary_scalar(BinaryOp::Mul, Scalar::F64(0.5)).unwrap();
        assert_eq!(real.to_json().unwrap(), vec![json!([0.5, 1.0]), json!([]), json!([2.5])]);

        let t = Array::typetracer(ints());
        let traced = t.binary_scalar(BinaryOp::Mul, Scalar::F64(0.5)).unwrap();
        assert_eq!(traced.form(), real.form());
    }

    #[test]
    fn nested_length_mismatch_is_a_data_error() {
        let a = Array::from_json(ints(), &[json!([1, 2])]).unwrap();
        let b = Array::from_json(ints(), &[json!([1])]).unwrap();
        assert!(matches!(a.binary(BinaryOp::Add, &b), Err(Error::Data(_))));
    }

    #[test]
    fn tracer_binary_touches_both_operands() {
        let form = Form::record([
            ("x", Form::primitive(DataType::Int64)),
            ("y", Form::primitive(DataType::Int64)),
            ("z", Form::primitive(DataType::Int64)),
        ]);
        let report = Report::new();
        let t = Array::source_tracer(form, &report, None);
        let sum = t
            .field("x")
            .unwrap()
            .binary(BinaryOp::Add, &t.field("y").unwrap())
            .unwrap();
        assert!(sum.is_typetracer());
        let snap = report.snapshot();
        assert_eq!(snap.data.iter().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn options_propagate_nulls() {
        let f = Form::optional(Form::primitive(DataType::Int64));
        let a = Array::from_json(f.clone(), &[json!(1), json!(null)]).unwrap();
        let out = unary(UnaryOp::Neg, &Datum::Array(a)).unwrap().into_array().unwrap();
        assert_eq!(out.form(), &f);
        assert_eq!(out.to_json().unwrap(), vec![json!(-1), json!(null)]);
    }
}
