//! Newline-delimited JSON source: one file per partition.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use jagged_core::{ColumnSet, Error, Form, Result, Value};
use jagged_graph::Source;
use jagged_tracer::Array;

/// Each line of each file is one row, parsed against the declared form
/// (or its projection). Blank lines are skipped; unknown keys are ignored.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    label: String,
    form: Form,
    paths: Vec<PathBuf>,
}

impl JsonLinesSource {
    pub fn new<P: AsRef<Path>>(form: Form, paths: impl IntoIterator<Item = P>) -> Self {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        let label = paths
            .first()
            .and_then(|p| p.file_stem())
            .map(|s| format!("jsonl:{}", s.to_string_lossy()))
            .unwrap_or_else(|| "jsonl".to_string());
        Self { label, form, paths }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Source for JsonLinesSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn form(&self) -> &Form {
        &self.form
    }

    fn npartitions(&self) -> usize {
        self.paths.len()
    }

    fn read_partition(&self, index: usize, columns: Option<&ColumnSet>) -> Result<Array> {
        let path = self.paths.get(index).ok_or_else(|| {
            Error::Source(format!("{}: partition {index} out of range", self.label))
        })?;
        let form = match columns {
            Some(cols) => self.form.project(cols),
            None => self.form.clone(),
        };
        let file = File::open(path)
            .map_err(|e| Error::Source(format!("open {}: {e}", path.display())))?;

        let mut rows = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.map_err(|e| Error::Source(format!("read {}: {e}", path.display())))?;
            if line.trim().is_empty() {
                continue;
            }
            let json: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                Error::Data(format!("{}:{}: {e}", path.display(), lineno + 1))
            })?;
            let row = Value::from_json(&json, &form).map_err(|e| {
                Error::Data(format!("{}:{}: {e}", path.display(), lineno + 1))
            })?;
            rows.push(row);
        }
        tracing::trace!(
            source = %self.label,
            partition = index,
            rows = rows.len(),
            "jsonl read"
        );
        Array::from_rows(form, rows)
    }

    fn project(&self, columns: &ColumnSet) -> Result<Option<ColumnSet>> {
        Ok(Some(columns.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jagged_core::DataType;
    use serde_json::json;
    use std::fs;

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jagged-jsonl-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_projected_rows() {
        let dir = scratch();
        let p = dir.join("part-0.jsonl");
        fs::write(&p, "{\"x\": [1, 2], \"y\": \"a\"}\n\n{\"x\": [], \"y\": \"b\"}\n").unwrap();

        let form = Form::record([
            ("x", Form::list(Form::primitive(DataType::Int64))),
            ("y", Form::primitive(DataType::Utf8)),
        ]);
        let src = JsonLinesSource::new(form, [&p]);
        assert_eq!(src.label(), "jsonl:part-0");
        assert_eq!(src.partition_sizes(), vec![None]);

        let cols: ColumnSet = ["x".to_string()].into();
        let a = src.read_partition(0, Some(&cols)).unwrap();
        assert_eq!(a.to_json().unwrap(), vec![json!({"x": [1, 2]}), json!({"x": []})]);

        let full = src.read_partition(0, None).unwrap();
        assert_eq!(full.len().unwrap(), 2);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn malformed_line_is_a_data_error() {
        let dir = scratch();
        let p = dir.join("bad.jsonl");
        fs::write(&p, "{\"x\": 1}\n{\"x\": \"nope\"}\n").unwrap();
        let src = JsonLinesSource::new(
            Form::record([("x", Form::primitive(DataType::Int64))]),
            [&p],
        );
        let err = src.read_partition(0, None).unwrap_err();
        assert!(matches!(err, Error::Data(ref m) if m.contains(":2:")));
        fs::remove_dir_all(dir).ok();
    }
}
