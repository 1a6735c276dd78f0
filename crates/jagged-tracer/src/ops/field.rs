//! Record field extraction.

use jagged_core::{Error, Form, Result, Value};

use crate::array::Array;
use crate::lineage::Lineage;

/// Form of `form.name`, projecting through lists, options and unions.
pub fn field_form(form: &Form, name: &str) -> Result<Form> {
    match form {
        Form::Record { fields } => fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.form.clone())
            .ok_or_else(|| {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                Error::TypeMismatch(format!("no field '{name}' in record with fields {names:?}"))
            }),
        Form::List { content } => Ok(Form::list(field_form(content, name)?)),
        Form::Optional { content } => Ok(Form::optional(field_form(content, name)?)),
        Form::Union { contents } => Ok(Form::union(
            contents
                .iter()
                .map(|c| field_form(c, name))
                .collect::<Result<Vec<_>>>()?,
        )),
        Form::Primitive { dtype } => Err(Error::TypeMismatch(format!(
            "cannot take field '{name}' of {dtype}"
        ))),
    }
}

pub fn field(array: &Array, name: &str) -> Result<Array> {
    let form = field_form(array.form(), name)?;
    if array.is_typetracer() {
        let lineage = field_lineage(array.form(), &array.lineage(), name);
        return Ok(Array::tracer(form, array.known_len(), lineage));
    }
    let rows = array
        .rows()?
        .iter()
        .map(|v| field_value(array.form(), v, name))
        .collect::<Result<Vec<_>>>()?;
    Ok(Array::from_rows_unchecked(form, rows))
}

fn field_lineage(form: &Form, lineage: &Lineage, name: &str) -> Lineage {
    match form {
        Form::Record { .. } => {
            let child = form
                .field_index(name)
                .map(|i| lineage.child(i))
                .unwrap_or_default();
            child.touch_field();
            child
        }
        Form::List { content } => Lineage::node(
            lineage.key().cloned(),
            vec![field_lineage(content, &lineage.child(0), name)],
        ),
        Form::Optional { content } => {
            let inner = field_lineage(content, &lineage.child(0), name);
            // Nested options collapse in the form, so they collapse here too.
            match field_form(content, name) {
                Ok(f) if f.is_optional() => inner,
                _ => Lineage::node(lineage.key().cloned(), vec![inner]),
            }
        }
        Form::Union { contents } => {
            // Union branches may merge in the result form; give up on
            // tracking and assume every branch is read.
            for (i, c) in contents.iter().enumerate() {
                field_lineage(c, &lineage.child(i), name).touch_data();
            }
            Lineage::untracked()
        }
        Form::Primitive { .. } => Lineage::untracked(),
    }
}

fn field_value(form: &Form, value: &Value, name: &str) -> Result<Value> {
    match (form, value) {
        (_, v) if v.is_null() => Ok(Value::NULL),
        (Form::Record { .. }, Value::Record(map)) => map
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Data(format!("row has no field '{name}'"))),
        (Form::List { content }, Value::List(items)) => items
            .iter()
            .map(|i| field_value(content, i, name))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        (Form::Optional { content }, v) => field_value(content, v, name),
        (Form::Union { contents }, v) => match contents.iter().find(|c| c.accepts(v)) {
            Some(branch) => field_value(branch, v, name),
            None => Err(Error::Data(format!("{v:?} matches no branch of {form}"))),
        },
        _ => Err(Error::Data(format!("{value:?} does not match {form}"))),
    }
}
