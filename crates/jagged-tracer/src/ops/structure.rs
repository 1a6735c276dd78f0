//! Structural operations: zipping, counting, flattening, masking, options.

use std::collections::BTreeMap;

use jagged_core::{DataType, Error, Form, Result, Scalar, Value};

use crate::array::{Array, TypedScalar};
use crate::lineage::Lineage;

use super::joint_length;

/// Zip arrays of equal length into one record array. Touches nothing.
pub fn record(fields: &[(&str, &Array)]) -> Result<Array> {
    for (i, (name, _)) in fields.iter().enumerate() {
        if fields[..i].iter().any(|(n, _)| n == name) {
            return Err(Error::InvalidValue(format!("duplicate record field '{name}'")));
        }
    }
    let form = Form::record(fields.iter().map(|(n, a)| (n.to_string(), a.form().clone())));
    let arrays: Vec<&Array> = fields.iter().map(|(_, a)| *a).collect();
    let length = joint_length(&arrays)?;

    if arrays.iter().any(|a| a.is_typetracer()) {
        let lineage = Lineage::node(None, arrays.iter().map(|a| a.lineage()).collect());
        return Ok(Array::tracer(form, length, lineage));
    }
    let columns = arrays.iter().map(|a| a.rows()).collect::<Result<Vec<_>>>()?;
    let rows = (0..length.unwrap_or(0))
        .map(|i| {
            Value::Record(
                fields
                    .iter()
                    .zip(&columns)
                    .map(|((name, _), col)| (name.to_string(), col[i].clone()))
                    .collect::<BTreeMap<_, _>>(),
            )
        })
        .collect();
    Ok(Array::from_rows_unchecked(form, rows))
}

/// Turn a possibly negative axis into a list depth (>= 1) below the rows.
fn nested_axis(form: &Form, axis: i64, op: &str) -> Result<usize> {
    let out_of_range = || {
        Error::InvalidValue(format!(
            "{op}: axis={axis} exceeds the depth of {form}"
        ))
    };
    let resolved = if axis < 0 {
        let depth = form.list_depth().ok_or_else(out_of_range)? as i64;
        depth + 1 + axis
    } else {
        axis
    };
    if resolved < 1 {
        return Err(Error::InvalidValue(format!(
            "{op}: axis={axis} must address a nested list (axis >= 1)"
        )));
    }
    Ok(resolved as usize)
}

fn num_form(form: &Form, axis: usize, full: &Form) -> Result<Form> {
    match form {
        Form::Optional { content } => Ok(Form::optional(num_form(content, axis, full)?)),
        Form::List { .. } if axis == 1 => Ok(Form::primitive(DataType::Int64)),
        Form::List { content } => Ok(Form::list(num_form(content, axis - 1, full)?)),
        _ => Err(Error::InvalidValue(format!(
            "num: axis exceeds the depth of {full}"
        ))),
    }
}

fn num_touch(form: &Form, lineage: &Lineage, axis: usize) {
    match form {
        Form::Optional { content } => num_touch(content, &lineage.child(0), axis),
        Form::List { .. } if axis == 1 => lineage.touch_shape(),
        Form::List { content } => num_touch(content, &lineage.child(0), axis - 1),
        _ => {}
    }
}

fn num_value(v: &Value, axis: usize) -> Result<Value> {
    match v {
        v if v.is_null() => Ok(Value::NULL),
        Value::List(items) if axis == 1 => Ok(Value::Scalar(Scalar::I64(items.len() as i64))),
        Value::List(items) => items
            .iter()
            .map(|i| num_value(i, axis - 1))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        other => Err(Error::Data(format!("num: expected a list, found {other:?}"))),
    }
}

/// Lengths of the lists at `axis` (1 = the lists inside each row).
pub fn num(array: &Array, axis: i64) -> Result<Array> {
    let k = nested_axis(array.form(), axis, "num")?;
    let form = num_form(array.form(), k, array.form())?;
    if array.is_typetracer() {
        num_touch(array.form(), &array.lineage(), k);
        return Ok(Array::tracer(form, array.known_len(), Lineage::untracked()));
    }
    let rows = array
        .rows()?
        .iter()
        .map(|v| num_value(v, k))
        .collect::<Result<Vec<_>>>()?;
    Ok(Array::from_rows_unchecked(form, rows))
}

/// Row count. On a tracer this only asks its sources for row counts.
pub fn length(array: &Array) -> Result<TypedScalar> {
    let form = Form::primitive(DataType::Int64);
    if array.is_typetracer() {
        for report in array.lineage().reports() {
            report.request_zero_field();
        }
        return Ok(TypedScalar::unknown(form));
    }
    TypedScalar::known(form, Scalar::I64(array.rows()?.len() as i64))
}

fn flatten_form(form: &Form, axis: usize, full: &Form) -> Result<Form> {
    match form {
        Form::List { content } if axis == 2 => match content.unwrap_optional() {
            Form::List { content: inner } => Ok(Form::list(inner.as_ref().clone())),
            _ => Err(Error::InvalidValue(format!(
                "flatten: axis exceeds the depth of {full}"
            ))),
        },
        Form::List { content } => Ok(Form::list(flatten_form(content, axis - 1, full)?)),
        Form::Optional { content } => Ok(Form::optional(flatten_form(content, axis, full)?)),
        _ => Err(Error::InvalidValue(format!(
            "flatten: axis exceeds the depth of {full}"
        ))),
    }
}

/// Lineage of an optional-wrapped node's content.
fn unwrap_optional_lineage(form: &Form, lineage: &Lineage) -> Lineage {
    if form.is_optional() {
        lineage.child(0)
    } else {
        lineage.clone()
    }
}

fn flatten_lineage(form: &Form, lineage: &Lineage, axis: usize) -> Lineage {
    match form {
        Form::List { content } if axis == 2 => {
            let inner = unwrap_optional_lineage(content, &lineage.child(0));
            lineage.touch_shape();
            inner.touch_shape();
            Lineage::node(lineage.key().cloned(), vec![inner.child(0)])
        }
        Form::List { content } => Lineage::node(
            lineage.key().cloned(),
            vec![flatten_lineage(content, &lineage.child(0), axis - 1)],
        ),
        Form::Optional { content } => {
            Lineage::node(lineage.key().cloned(), vec![flatten_lineage(content, &lineage.child(0), axis)])
        }
        _ => Lineage::untracked(),
    }
}

fn flatten_value(v: &Value, axis: usize) -> Result<Value> {
    match v {
        v if v.is_null() => Ok(Value::NULL),
        Value::List(items) if axis == 2 => {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::List(inner) => out.extend(inner.iter().cloned()),
                    i if i.is_null() => {}
                    other => {
                        return Err(Error::Data(format!("flatten: expected a list, found {other:?}")))
                    }
                }
            }
            Ok(Value::List(out))
        }
        Value::List(items) => items
            .iter()
            .map(|i| flatten_value(i, axis - 1))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        other => Err(Error::Data(format!("flatten: expected a list, found {other:?}"))),
    }
}

/// Remove one level of nesting. `axis = 1` merges the lists of all rows into
/// one sequence of rows, so the result length is data-dependent.
pub fn flatten(array: &Array, axis: i64) -> Result<Array> {
    let k = nested_axis(array.form(), axis, "flatten")?;
    if k == 1 {
        let content = match array.form().unwrap_optional() {
            Form::List { content } => content.as_ref().clone(),
            _ => {
                return Err(Error::InvalidValue(format!(
                    "flatten: axis=1 exceeds the depth of {}",
                    array.form()
                )))
            }
        };
        if array.is_typetracer() {
            let rows = unwrap_optional_lineage(array.form(), &array.lineage());
            rows.touch_shape();
            return Ok(Array::tracer(content, None, rows.child(0)));
        }
        let mut out = Vec::new();
        for row in array.rows()? {
            match row {
                Value::List(items) => out.extend(items.iter().cloned()),
                r if r.is_null() => {}
                other => {
                    return Err(Error::Data(format!("flatten: expected a list, found {other:?}")))
                }
            }
        }
        return Ok(Array::from_rows_unchecked(content, out));
    }

    let form = flatten_form(array.form(), k, array.form())?;
    if array.is_typetracer() {
        let lineage = flatten_lineage(array.form(), &array.lineage(), k);
        return Ok(Array::tracer(form, array.known_len(), lineage));
    }
    let rows = array
        .rows()?
        .iter()
        .map(|v| flatten_value(v, k))
        .collect::<Result<Vec<_>>>()?;
    Ok(Array::from_rows_unchecked(form, rows))
}

fn check_mask(array_form: &Form, mask_form: &Form) -> Result<()> {
    match (array_form.unwrap_optional(), mask_form.unwrap_optional()) {
        (_, Form::Primitive { dtype: DataType::Boolean }) => Ok(()),
        (Form::List { content: a }, Form::List { content: m }) => check_mask(a, m),
        _ => Err(Error::TypeMismatch(format!(
            "cannot filter {array_form} with a mask of type {mask_form}"
        ))),
    }
}

fn filter_items(items: &[Value], mask: &[Value]) -> Result<Vec<Value>> {
    if items.len() != mask.len() {
        return Err(Error::Data(format!(
            "mask of length {} does not fit a list of length {}",
            mask.len(),
            items.len()
        )));
    }
    let mut out = Vec::new();
    for (item, m) in items.iter().zip(mask) {
        match m {
            Value::Scalar(Scalar::Bool(true)) => out.push(item.clone()),
            Value::Scalar(Scalar::Bool(false) | Scalar::Null) => {}
            Value::List(inner_mask) => match item {
                Value::List(inner) => out.push(Value::List(filter_items(inner, inner_mask)?)),
                i if i.is_null() => out.push(Value::NULL),
                other => {
                    return Err(Error::Data(format!("mask expects a list, found {other:?}")))
                }
            },
            other => return Err(Error::Data(format!("invalid mask value {other:?}"))),
        }
    }
    Ok(out)
}

/// Keep rows where a boolean mask is true; a nested mask filters the items
/// of each row's lists instead. Missing mask values drop the item.
pub fn filter(array: &Array, mask: &Array) -> Result<Array> {
    check_mask(array.form(), mask.form())?;
    let nested = !matches!(mask.form().unwrap_optional(), Form::Primitive { .. });
    let length = joint_length(&[array, mask])?;
    if array.is_typetracer() || mask.is_typetracer() {
        mask.touch_data();
        let out_len = if nested { length } else { None };
        return Ok(Array::tracer(array.form().clone(), out_len, array.lineage()));
    }
    let rows = filter_items(array.rows()?, mask.rows()?)?;
    Ok(Array::from_rows_unchecked(array.form().clone(), rows))
}

/// Per-row missing-value flags.
pub fn is_none(array: &Array) -> Result<Array> {
    let form = Form::primitive(DataType::Boolean);
    if array.is_typetracer() {
        array.touch_data();
        return Ok(Array::tracer(form, array.known_len(), Lineage::untracked()));
    }
    let rows = array
        .rows()?
        .iter()
        .map(|v| Value::Scalar(Scalar::Bool(v.is_null())))
        .collect();
    Ok(Array::from_rows_unchecked(form, rows))
}

fn fill_form(form: &Form, value: &Scalar) -> Result<Form> {
    Ok(match form {
        Form::Optional { content } => match content.as_ref() {
            Form::Primitive { dtype } => {
                value.cast(*dtype)?;
                Form::primitive(*dtype)
            }
            other => Form::optional(fill_form(other, value)?),
        },
        Form::List { content } => Form::list(fill_form(content, value)?),
        Form::Record { fields } => Form::record(
            fields
                .iter()
                .map(|f| Ok((f.name.clone(), fill_form(&f.form, value)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => other.clone(),
    })
}

fn fill_value(form: &Form, v: &Value, value: &Scalar) -> Result<Value> {
    match (form, v) {
        (Form::Optional { content }, v) if v.is_null() => match content.as_ref() {
            Form::Primitive { dtype } => Ok(Value::Scalar(value.cast(*dtype)?)),
            _ => Ok(Value::NULL),
        },
        (Form::Optional { content }, v) => fill_value(content, v, value),
        (Form::List { content }, Value::List(items)) => items
            .iter()
            .map(|i| fill_value(content, i, value))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        (Form::Record { fields }, Value::Record(map)) => fields
            .iter()
            .map(|f| {
                let inner = map.get(&f.name).cloned().unwrap_or(Value::NULL);
                Ok((f.name.clone(), fill_value(&f.form, &inner, value)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Record),
        (_, v) => Ok(v.clone()),
    }
}

/// Replace missing leaf values with `value`, dropping the option from the
/// leaf type. Options around lists or records are left alone.
pub fn fill_none(array: &Array, value: &Scalar) -> Result<Array> {
    if value.is_null() {
        return Err(Error::InvalidValue("fill_none needs a non-null value".into()));
    }
    let form = fill_form(array.form(), value)?;
    if array.is_typetracer() {
        array.touch_data();
        return Ok(Array::tracer(form, array.known_len(), Lineage::untracked()));
    }
    let rows = array
        .rows()?
        .iter()
        .map(|v| fill_value(array.form(), v, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(Array::from_rows_unchecked(form, rows))
}
