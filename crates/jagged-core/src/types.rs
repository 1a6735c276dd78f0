//! Row values: scalars at the leaves, lists and records above them.
//!
//! Values are untyped on their own; a `Form` gives them meaning. Conversion
//! from JSON is always form-directed so integers and floats land in the
//! declared width.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::form::{join_path, DataType, Form};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Scalar {
    /// `None` for `Null`, which has no type of its own.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F32(_) => Some(DataType::Float32),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(i64::from(*b)),
            Scalar::I32(v) => Some(i64::from(*v)),
            Scalar::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::F32(v) => Some(f64::from(*v)),
            Scalar::F64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Truthiness used by `any`/`all`: non-zero numbers and `true`.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Null | Scalar::Str(_) => None,
            other => other.as_f64().map(|v| v != 0.0),
        }
    }

    /// Convert a numeric or boolean scalar to `dtype`.
    ///
    /// Integer narrowing wraps, matching fixed-width array arithmetic.
    pub fn cast(&self, dtype: DataType) -> Result<Scalar> {
        if self.is_null() {
            return Ok(Scalar::Null);
        }
        let bad = || Error::TypeMismatch(format!("cannot cast {self:?} to {dtype}"));
        Ok(match dtype {
            DataType::Boolean => Scalar::Bool(self.truthy().ok_or_else(bad)?),
            DataType::Int32 => Scalar::I32(self.as_i64().ok_or_else(bad)? as i32),
            DataType::Int64 => Scalar::I64(self.as_i64().ok_or_else(bad)?),
            DataType::Float32 => Scalar::F32(self.as_f64().ok_or_else(bad)? as f32),
            DataType::Float64 => Scalar::F64(self.as_f64().ok_or_else(bad)?),
            DataType::Utf8 => match self {
                Scalar::Str(s) => Scalar::Str(s.clone()),
                _ => return Err(bad()),
            },
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Scalar::Null => J::Null,
            Scalar::Bool(b) => J::Bool(*b),
            Scalar::I32(v) => J::from(*v),
            Scalar::I64(v) => J::from(*v),
            Scalar::F32(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(J::Number)
                .unwrap_or(J::Null),
            Scalar::F64(v) => serde_json::Number::from_f64(*v)
                .map(J::Number)
                .unwrap_or(J::Null),
            Scalar::Str(s) => J::String(s.clone()),
        }
    }
}

/// Total order over scalars: nulls first, NaN last within floats, numbers
/// compared by value across widths.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Str(x), Str(y)) => x.cmp(y),
        (Str(_), _) => Ordering::Greater,
        (_, Str(_)) => Ordering::Less,
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                match (x.is_nan(), y.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                }
            }
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub const NULL: Value = Value::Scalar(Scalar::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Scalar(Scalar::Null))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Parse one row of JSON against `form`.
    pub fn from_json(json: &serde_json::Value, form: &Form) -> Result<Value> {
        value_from_json(json, form, "")
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Scalar(s) => s.to_json(),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Drop record fields that `form` does not declare.
    pub fn prune(&self, form: &Form) -> Value {
        match (self, form) {
            (Value::Record(map), Form::Record { fields }) => Value::Record(
                fields
                    .iter()
                    .filter_map(|f| map.get(&f.name).map(|v| (f.name.clone(), v.prune(&f.form))))
                    .collect(),
            ),
            (Value::List(items), Form::List { content }) => {
                Value::List(items.iter().map(|i| i.prune(content)).collect())
            }
            (v, Form::Optional { content }) if !v.is_null() => v.prune(content),
            (v, Form::Union { contents }) => contents
                .iter()
                .find(|c| v.fits_loosely(c))
                .map(|c| v.prune(c))
                .unwrap_or_else(|| v.clone()),
            (v, _) => v.clone(),
        }
    }

    // Shape-only match used to pick a union branch while pruning.
    fn fits_loosely(&self, form: &Form) -> bool {
        match (self, form.unwrap_optional()) {
            (Value::Record(map), Form::Record { fields }) => {
                fields.iter().all(|f| map.contains_key(&f.name))
            }
            (Value::List(_), Form::List { .. }) => true,
            (Value::Scalar(s), Form::Primitive { dtype }) => s.data_type() == Some(*dtype),
            _ => false,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

fn value_from_json(json: &serde_json::Value, form: &Form, path: &str) -> Result<Value> {
    let mismatch = || {
        let at = if path.is_empty() { "<row>" } else { path };
        Error::Data(format!("expected {form} at '{at}', found {json}"))
    };
    match form {
        Form::Primitive { dtype } => scalar_from_json(json, *dtype)
            .map(Value::Scalar)
            .ok_or_else(mismatch),
        Form::Optional { content } => {
            if json.is_null() {
                Ok(Value::NULL)
            } else {
                value_from_json(json, content, path)
            }
        }
        Form::List { content } => {
            let items = json.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .map(|i| value_from_json(i, content, path))
                .collect::<Result<Vec<_>>>()
                .map(Value::List)
        }
        Form::Record { fields } => {
            let obj = json.as_object().ok_or_else(mismatch)?;
            let mut out = BTreeMap::new();
            for f in fields {
                let child = join_path(path, &f.name);
                let v = match obj.get(&f.name) {
                    Some(v) => value_from_json(v, &f.form, &child)?,
                    None if f.form.is_optional() => Value::NULL,
                    None => {
                        return Err(Error::Data(format!("missing field '{child}'")));
                    }
                };
                out.insert(f.name.clone(), v);
            }
            Ok(Value::Record(out))
        }
        Form::Union { contents } => contents
            .iter()
            .find_map(|c| value_from_json(json, c, path).ok())
            .ok_or_else(mismatch),
    }
}

fn scalar_from_json(json: &serde_json::Value, dtype: DataType) -> Option<Scalar> {
    match dtype {
        DataType::Boolean => json.as_bool().map(Scalar::Bool),
        DataType::Int32 => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Scalar::I32),
        DataType::Int64 => json.as_i64().map(Scalar::I64),
        DataType::Float32 => json.as_f64().map(|v| Scalar::F32(v as f32)),
        DataType::Float64 => json.as_f64().map(Scalar::F64),
        DataType::Utf8 => json.as_str().map(|s| Scalar::Str(s.to_string())),
    }
}
