//! Structural types ("forms") for nested, variable-length data.
//!
//! A form describes one row of a partition: rows themselves are the implicit
//! outermost dimension, so a partition of `var * int64` holds rows that are
//! each a list of integers. Leaf columns are addressed by dotted record paths
//! (`points.x`); lists and options are transparent in column paths.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Scalar, Value};

/// Set of dotted leaf column paths.
pub type ColumnSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
}

impl DataType {
    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Integers, floats and booleans (booleans count as 0/1).
    pub fn is_numeric(self) -> bool {
        self != DataType::Utf8
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Boolean => "bool",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Utf8 => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub form: Form,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Form {
    Primitive { dtype: DataType },
    List { content: Box<Form> },
    Record { fields: Vec<Field> },
    Optional { content: Box<Form> },
    Union { contents: Vec<Form> },
}

/// Join a record path prefix and a field name.
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Whether `column` lives at or below `path`.
pub fn path_covers(path: &str, column: &str) -> bool {
    path.is_empty()
        || column == path
        || (column.starts_with(path) && column[path.len()..].starts_with('.'))
}

impl Form {
    pub fn primitive(dtype: DataType) -> Form {
        Form::Primitive { dtype }
    }

    pub fn list(content: Form) -> Form {
        Form::List {
            content: Box::new(content),
        }
    }

    pub fn record<I, S>(fields: I) -> Form
    where
        I: IntoIterator<Item = (S, Form)>,
        S: Into<String>,
    {
        Form::Record {
            fields: fields
                .into_iter()
                .map(|(name, form)| Field {
                    name: name.into(),
                    form,
                })
                .collect(),
        }
    }

    /// Wrap in an option; options never nest.
    pub fn optional(content: Form) -> Form {
        match content {
            Form::Optional { .. } => content,
            other => Form::Optional {
                content: Box::new(other),
            },
        }
    }

    /// Build a union, flattening nested unions and dropping duplicates.
    /// A single distinct branch collapses to that branch.
    pub fn union(contents: Vec<Form>) -> Form {
        let mut flat: Vec<Form> = Vec::new();
        for c in contents {
            let branches = match c {
                Form::Union { contents } => contents,
                other => vec![other],
            };
            for b in branches {
                if !flat.contains(&b) {
                    flat.push(b);
                }
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Form::Union { contents: vec![] })
        } else {
            Form::Union { contents: flat }
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Form::Optional { .. })
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Form::Record { .. })
    }

    /// Strip one option level, if any.
    pub fn unwrap_optional(&self) -> &Form {
        match self {
            Form::Optional { content } => content,
            other => other,
        }
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Form::Record { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields()?.iter().position(|f| f.name == name)
    }

    /// Number of list levels from the top, looking through options.
    /// `None` when a record or union sits on the spine.
    pub fn list_depth(&self) -> Option<usize> {
        match self {
            Form::Primitive { .. } => Some(0),
            Form::List { content } => content.list_depth().map(|d| d + 1),
            Form::Optional { content } => content.list_depth(),
            Form::Record { .. } | Form::Union { .. } => None,
        }
    }

    /// The primitive leaf at the bottom of a list/option spine.
    pub fn leaf_dtype(&self) -> Option<DataType> {
        match self {
            Form::Primitive { dtype } => Some(*dtype),
            Form::List { content } | Form::Optional { content } => content.leaf_dtype(),
            Form::Record { .. } | Form::Union { .. } => None,
        }
    }

    /// Dotted paths of every leaf column, in field order.
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns("", &mut out);
        out
    }

    fn collect_columns(&self, path: &str, out: &mut Vec<String>) {
        match self {
            Form::Primitive { .. } => {
                if !out.iter().any(|c| c == path) {
                    out.push(path.to_string());
                }
            }
            Form::List { content } | Form::Optional { content } => {
                content.collect_columns(path, out)
            }
            Form::Record { fields } => {
                for f in fields {
                    f.form.collect_columns(&join_path(path, &f.name), out);
                }
            }
            Form::Union { contents } => {
                for c in contents {
                    c.collect_columns(path, out);
                }
            }
        }
    }

    /// First leaf column at or below `path`, if the path exists.
    pub fn first_column_under(&self, path: &str) -> Option<String> {
        self.columns().into_iter().find(|c| path_covers(path, c))
    }

    /// Restrict record fields to those leading to a column in `columns`.
    ///
    /// The top-level record is always kept, possibly with zero fields, so a
    /// projected read still yields one row per source row.
    pub fn project(&self, columns: &ColumnSet) -> Form {
        self.project_at("", columns, true)
            .unwrap_or_else(|| self.clone())
    }

    fn project_at(&self, path: &str, columns: &ColumnSet, top: bool) -> Option<Form> {
        match self {
            Form::Primitive { .. } => {
                if top || columns.contains(path) {
                    Some(self.clone())
                } else {
                    None
                }
            }
            Form::List { content } => content.project_at(path, columns, top).map(Form::list),
            Form::Optional { content } => content
                .project_at(path, columns, top)
                .map(Form::optional),
            Form::Record { fields } => {
                let kept: Vec<Field> = fields
                    .iter()
                    .filter_map(|f| {
                        f.form
                            .project_at(&join_path(path, &f.name), columns, false)
                            .map(|form| Field {
                                name: f.name.clone(),
                                form,
                            })
                    })
                    .collect();
                if kept.is_empty() && !top {
                    None
                } else {
                    Some(Form::Record { fields: kept })
                }
            }
            Form::Union { contents } => {
                let projected: Vec<Option<Form>> = contents
                    .iter()
                    .map(|c| c.project_at(path, columns, top))
                    .collect();
                if projected.iter().all(Option::is_none) {
                    return None;
                }
                let branches = projected
                    .into_iter()
                    .zip(contents)
                    .map(|(p, orig)| p.unwrap_or_else(|| orig.clone()))
                    .collect();
                Some(Form::Union { contents: branches })
            }
        }
    }

    /// Whether `value` is a valid row of this form.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Form::Optional { .. }, Value::Scalar(Scalar::Null)) => true,
            (Form::Optional { content }, v) => content.accepts(v),
            (Form::Primitive { dtype }, Value::Scalar(s)) => s.data_type() == Some(*dtype),
            (Form::List { content }, Value::List(items)) => {
                items.iter().all(|i| content.accepts(i))
            }
            (Form::Record { fields }, Value::Record(map)) => {
                map.len() == fields.len()
                    && fields
                        .iter()
                        .all(|f| map.get(&f.name).is_some_and(|v| f.form.accepts(v)))
            }
            (Form::Union { contents }, v) => contents.iter().any(|c| c.accepts(v)),
            _ => false,
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Primitive { dtype } => write!(f, "{dtype}"),
            Form::List { content } => write!(f, "var * {content}"),
            Form::Record { fields } => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.form)?;
                }
                f.write_str("}")
            }
            Form::Optional { content } => match content.as_ref() {
                Form::List { .. } | Form::Union { .. } => write!(f, "option[{content}]"),
                _ => write!(f, "?{content}"),
            },
            Form::Union { contents } => {
                f.write_str("union[")?;
                for (i, c) in contents.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Form {
        Form::record([
            ("run", Form::primitive(DataType::Int64)),
            (
                "points",
                Form::list(Form::record([
                    ("x", Form::primitive(DataType::Float64)),
                    ("y", Form::optional(Form::primitive(DataType::Float64))),
                ])),
            ),
        ])
    }

    #[test]
    fn columns_follow_field_order() {
        assert_eq!(events().columns(), vec!["run", "points.x", "points.y"]);
    }

    #[test]
    fn project_keeps_only_selected_leaves() {
        let cols: ColumnSet = ["points.y".to_string()].into_iter().collect();
        let projected = events().project(&cols);
        assert_eq!(projected.to_string(), "{points: var * {y: ?float64}}");
    }

    #[test]
    fn project_to_nothing_keeps_empty_top_record() {
        let projected = events().project(&ColumnSet::new());
        assert_eq!(projected, Form::Record { fields: vec![] });
    }

    #[test]
    fn path_covers_respects_segments() {
        assert!(path_covers("points", "points.x"));
        assert!(!path_covers("point", "points.x"));
        assert!(path_covers("", "run"));
    }

    #[test]
    fn optional_and_union_normalize() {
        let f = Form::optional(Form::optional(Form::primitive(DataType::Int32)));
        assert_eq!(f.to_string(), "?int32");
        let u = Form::union(vec![
            Form::primitive(DataType::Int64),
            Form::union(vec![Form::primitive(DataType::Int64)]),
        ]);
        assert_eq!(u, Form::primitive(DataType::Int64));
    }
}
