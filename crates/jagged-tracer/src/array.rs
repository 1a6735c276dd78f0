//! Arrays, typed scalars, and the `Datum` that partition tasks pass around.

use jagged_core::{ColumnSet, Error, Form, Result, Scalar, Value};

use crate::lineage::Lineage;
use crate::report::Report;

#[derive(Debug, Clone)]
pub enum Content {
    /// Concrete rows, each valid under the array's form.
    Rows(Vec<Value>),
    /// No rows: only structure, an optional length, and lineage.
    Tracer {
        length: Option<usize>,
        lineage: Lineage,
    },
}

#[derive(Debug, Clone)]
pub struct Array {
    form: Form,
    content: Content,
}

impl Array {
    /// Concrete array; every row is checked against `form`.
    pub fn from_rows(form: Form, rows: Vec<Value>) -> Result<Array> {
        if let Some(i) = rows.iter().position(|r| !form.accepts(r)) {
            return Err(Error::Data(format!(
                "row {i} does not match {form}: {:?}",
                rows[i]
            )));
        }
        Ok(Array::from_rows_unchecked(form, rows))
    }

    pub(crate) fn from_rows_unchecked(form: Form, rows: Vec<Value>) -> Array {
        Array {
            form,
            content: Content::Rows(rows),
        }
    }

    /// Parse JSON rows against `form`.
    pub fn from_json(form: Form, rows: &[serde_json::Value]) -> Result<Array> {
        let values = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                Value::from_json(r, &form).map_err(|e| Error::Data(format!("row {i}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Array::from_rows_unchecked(form, values))
    }

    /// Tracer with untracked lineage and unknown length.
    pub fn typetracer(form: Form) -> Array {
        Array::tracer(form, None, Lineage::untracked())
    }

    /// Tracer for a source read: every node reports into `report`.
    pub fn source_tracer(form: Form, report: &Report, length: Option<usize>) -> Array {
        let lineage = Lineage::from_source(&form, report);
        Array::tracer(form, length, lineage)
    }

    pub(crate) fn tracer(form: Form, length: Option<usize>, lineage: Lineage) -> Array {
        Array {
            form,
            content: Content::Tracer { length, lineage },
        }
    }

    /// Drop the rows, keep the structure.
    pub fn to_typetracer(&self) -> Array {
        match &self.content {
            Content::Rows(rows) => Array::tracer(self.form.clone(), Some(rows.len()), Lineage::untracked()),
            Content::Tracer { .. } => self.clone(),
        }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn is_typetracer(&self) -> bool {
        matches!(self.content, Content::Tracer { .. })
    }

    /// Untracked for concrete arrays.
    pub fn lineage(&self) -> Lineage {
        match &self.content {
            Content::Tracer { lineage, .. } => lineage.clone(),
            Content::Rows(_) => Lineage::untracked(),
        }
    }

    /// Length if known without data.
    pub fn known_len(&self) -> Option<usize> {
        match &self.content {
            Content::Rows(rows) => Some(rows.len()),
            Content::Tracer { length, .. } => *length,
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.known_len().ok_or_else(|| {
            Error::untraceable("len", "the length of this typetracer is not known")
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    pub fn rows(&self) -> Result<&[Value]> {
        match &self.content {
            Content::Rows(rows) => Ok(rows),
            Content::Tracer { .. } => Err(Error::untraceable(
                "values",
                "a typetracer has no values; compute the collection first",
            )),
        }
    }

    pub fn into_rows(self) -> Result<Vec<Value>> {
        match self.content {
            Content::Rows(rows) => Ok(rows),
            Content::Tracer { .. } => Err(Error::untraceable(
                "values",
                "a typetracer has no values; compute the collection first",
            )),
        }
    }

    pub fn to_json(&self) -> Result<Vec<serde_json::Value>> {
        match &self.content {
            Content::Rows(rows) => Ok(rows.iter().map(Value::to_json).collect()),
            Content::Tracer { .. } => Err(Error::untraceable(
                "to_json",
                "a typetracer cannot be converted to host values",
            )),
        }
    }

    /// Mark every column under this array as read.
    pub fn touch_data(&self) {
        if let Content::Tracer { lineage, .. } = &self.content {
            lineage.touch_data();
        }
    }

    /// Keep only the record fields leading to `columns`.
    pub fn project(&self, columns: &ColumnSet) -> Array {
        let form = self.form.project(columns);
        match &self.content {
            Content::Rows(rows) => {
                let rows = rows.iter().map(|r| r.prune(&form)).collect();
                Array::from_rows_unchecked(form, rows)
            }
            Content::Tracer { length, lineage } => {
                let lineage = lineage.project(&self.form, &form);
                Array::tracer(form, *length, lineage)
            }
        }
    }

    /// Concatenate partitions in order. All parts must share one form.
    pub fn concat(form: Form, parts: Vec<Array>) -> Result<Array> {
        let mut rows = Vec::new();
        for (i, part) in parts.into_iter().enumerate() {
            if part.form != form {
                return Err(Error::Invariant(format!(
                    "partition {i} has type {} but {form} was expected",
                    part.form
                )));
            }
            rows.extend(part.into_rows()?);
        }
        Ok(Array::from_rows_unchecked(form, rows))
    }

    pub fn same_type(&self, other: &Array) -> bool {
        self.form == other.form
    }
}

impl PartialEq for Array {
    /// Concrete arrays compare by form and rows; tracers by form and length.
    fn eq(&self, other: &Self) -> bool {
        if self.form != other.form {
            return false;
        }
        match (&self.content, &other.content) {
            (Content::Rows(a), Content::Rows(b)) => a == b,
            (Content::Tracer { length: a, .. }, Content::Tracer { length: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// A zero-dimensional result, e.g. a full reduction.
///
/// `value` is `None` for a tracer scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedScalar {
    form: Form,
    value: Option<Scalar>,
}

impl TypedScalar {
    pub fn known(form: Form, value: Scalar) -> Result<TypedScalar> {
        let ok = match (&value, form.unwrap_optional()) {
            (Scalar::Null, _) => form.is_optional(),
            (v, Form::Primitive { dtype }) => v.data_type() == Some(*dtype),
            _ => false,
        };
        if !ok {
            return Err(Error::TypeMismatch(format!("{value:?} is not a valid {form}")));
        }
        Ok(TypedScalar {
            form,
            value: Some(value),
        })
    }

    pub fn unknown(form: Form) -> TypedScalar {
        TypedScalar { form, value: None }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn is_typetracer(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Result<&Scalar> {
        self.value.as_ref().ok_or_else(|| {
            Error::untraceable("scalar value", "a typetracer scalar has no value")
        })
    }

    pub fn to_typetracer(&self) -> TypedScalar {
        TypedScalar::unknown(self.form.clone())
    }
}

/// What a partition task produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Array(Array),
    Scalar(TypedScalar),
}

impl Datum {
    pub fn form(&self) -> &Form {
        match self {
            Datum::Array(a) => a.form(),
            Datum::Scalar(s) => s.form(),
        }
    }

    pub fn is_typetracer(&self) -> bool {
        match self {
            Datum::Array(a) => a.is_typetracer(),
            Datum::Scalar(s) => s.is_typetracer(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Datum::Scalar(_))
    }

    pub fn same_type(&self, other: &Datum) -> bool {
        self.is_scalar() == other.is_scalar() && self.form() == other.form()
    }

    pub fn to_typetracer(&self) -> Datum {
        match self {
            Datum::Array(a) => Datum::Array(a.to_typetracer()),
            Datum::Scalar(s) => Datum::Scalar(s.to_typetracer()),
        }
    }

    pub fn touch_data(&self) {
        if let Datum::Array(a) = self {
            a.touch_data();
        }
    }

    pub fn lineage(&self) -> Lineage {
        match self {
            Datum::Array(a) => a.lineage(),
            Datum::Scalar(_) => Lineage::untracked(),
        }
    }

    pub fn as_array(&self) -> Result<&Array> {
        match self {
            Datum::Array(a) => Ok(a),
            Datum::Scalar(s) => Err(Error::TypeMismatch(format!(
                "expected an array, found a scalar of type {}",
                s.form()
            ))),
        }
    }

    pub fn into_array(self) -> Result<Array> {
        match self {
            Datum::Array(a) => Ok(a),
            Datum::Scalar(s) => Err(Error::TypeMismatch(format!(
                "expected an array, found a scalar of type {}",
                s.form()
            ))),
        }
    }

    pub fn into_scalar(self) -> Result<TypedScalar> {
        match self {
            Datum::Scalar(s) => Ok(s),
            Datum::Array(a) => Err(Error::TypeMismatch(format!(
                "expected a scalar, found an array of type {}",
                a.form()
            ))),
        }
    }
}

impl From<Array> for Datum {
    fn from(a: Array) -> Self {
        Datum::Array(a)
    }
}

impl From<TypedScalar> for Datum {
    fn from(s: TypedScalar) -> Self {
        Datum::Scalar(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jagged_core::DataType;
    use serde_json::json;

    fn xy() -> Form {
        Form::record([
            ("x", Form::primitive(DataType::Int64)),
            ("y", Form::primitive(DataType::Float64)),
        ])
    }

    #[test]
    fn tracer_refuses_values() {
        let t = Array::typetracer(xy());
        assert!(matches!(t.rows(), Err(Error::Untraceable { .. })));
        assert!(matches!(t.to_json(), Err(Error::Untraceable { .. })));
        assert!(matches!(t.len(), Err(Error::Untraceable { .. })));
    }

    #[test]
    fn project_prunes_rows() {
        let a = Array::from_json(xy(), &[json!({"x": 1, "y": 2.5})]).unwrap();
        let cols: ColumnSet = ["y".to_string()].into_iter().collect();
        let p = a.project(&cols);
        assert_eq!(p.to_json().unwrap(), vec![json!({"y": 2.5})]);
    }

    #[test]
    fn concat_rejects_foreign_forms() {
        let a = Array::from_json(xy(), &[json!({"x": 1, "y": 2.0})]).unwrap();
        let b = Array::from_json(Form::primitive(DataType::Int64), &[json!(1)]).unwrap();
        assert!(matches!(
            Array::concat(xy(), vec![a, b]),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn typed_scalar_checks_its_form() {
        assert!(TypedScalar::known(Form::primitive(DataType::Int64), Scalar::I64(3)).is_ok());
        assert!(TypedScalar::known(Form::primitive(DataType::Int64), Scalar::Null).is_err());
        assert!(TypedScalar::known(
            Form::optional(Form::primitive(DataType::Int64)),
            Scalar::Null
        )
        .is_ok());
    }
}
