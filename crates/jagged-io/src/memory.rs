//! In-memory source for tests and small inputs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jagged_core::{ColumnSet, Error, Form, Result};
use jagged_graph::Source;
use jagged_tracer::Array;

/// One `read_partition` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub partition: usize,
    pub columns: Option<ColumnSet>,
}

/// Thread-safe in-memory partitions.
#[derive(Debug, Clone)]
pub struct MemorySource {
    label: String,
    form: Form,
    partitions: Vec<Array>,
    projectable: bool,
    reads: Arc<Mutex<Vec<ReadRecord>>>,
}

impl MemorySource {
    /// Every partition must be concrete and of type `form`.
    pub fn new(label: impl Into<String>, form: Form, partitions: Vec<Array>) -> Result<Self> {
        for (i, p) in partitions.iter().enumerate() {
            if p.is_typetracer() {
                return Err(Error::Source(format!("partition {i} holds no data")));
            }
            if p.form() != &form {
                return Err(Error::Source(format!(
                    "partition {i} has type {}, source declares {form}",
                    p.form()
                )));
            }
        }
        Ok(Self {
            label: label.into(),
            form,
            partitions,
            projectable: true,
            reads: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Partitions given as JSON rows.
    pub fn from_json(
        label: impl Into<String>,
        form: Form,
        partitions: &[Vec<serde_json::Value>],
    ) -> Result<Self> {
        let arrays = partitions
            .iter()
            .map(|rows| Array::from_json(form.clone(), rows))
            .collect::<Result<Vec<_>>>()?;
        Self::new(label, form, arrays)
    }

    /// Make `project` report that reads cannot be narrowed.
    pub fn without_projection(mut self) -> Self {
        self.projectable = false;
        self
    }

    fn log(&self) -> MutexGuard<'_, Vec<ReadRecord>> {
        self.reads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads so far, in call order. Shared between clones.
    pub fn reads(&self) -> Vec<ReadRecord> {
        self.log().clone()
    }

    pub fn clear_reads(&self) {
        self.log().clear();
    }
}

impl Source for MemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn form(&self) -> &Form {
        &self.form
    }

    fn npartitions(&self) -> usize {
        self.partitions.len()
    }

    fn partition_sizes(&self) -> Vec<Option<usize>> {
        self.partitions.iter().map(Array::known_len).collect()
    }

    fn read_partition(&self, index: usize, columns: Option<&ColumnSet>) -> Result<Array> {
        let part = self.partitions.get(index).ok_or_else(|| {
            Error::Source(format!(
                "{}: partition {index} out of range ({} partitions)",
                self.label,
                self.partitions.len()
            ))
        })?;
        self.log().push(ReadRecord {
            partition: index,
            columns: columns.cloned(),
        });
        tracing::trace!(source = %self.label, partition = index, ?columns, "memory read");
        Ok(match columns {
            Some(cols) => part.project(cols),
            None => part.clone(),
        })
    }

    fn project(&self, columns: &ColumnSet) -> Result<Option<ColumnSet>> {
        if !self.projectable {
            return Ok(None);
        }
        let known = self.form.columns();
        if let Some(missing) = columns.iter().find(|c| !known.contains(c)) {
            return Err(Error::Source(format!(
                "{}: no column `{missing}` in {}",
                self.label, self.form
            )));
        }
        Ok(Some(columns.clone()))
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
    fn projected_reads_keep_row_count_and_log() {
        let src = MemorySource::from_json(
            "xy",
            xy(),
            &[vec![json!({"x": 1, "y": 0.5}), json!({"x": 2, "y": 1.5})]],
        )
        .unwrap();
        let cols: ColumnSet = ["x".to_string()].into();
        let a = src.read_partition(0, Some(&cols)).unwrap();
        assert_eq!(a.len().unwrap(), 2);
        assert_eq!(a.to_json().unwrap(), vec![json!({"x": 1}), json!({"x": 2})]);
        assert_eq!(
            src.reads(),
            vec![ReadRecord {
                partition: 0,
                columns: Some(cols)
            }]
        );
        assert_eq!(src.partition_sizes(), vec![Some(2)]);
    }

    #[test]
    fn unknown_columns_and_opt_out() {
        let src = MemorySource::from_json("xy", xy(), &[vec![]]).unwrap();
        let bad: ColumnSet = ["w".to_string()].into();
        assert!(matches!(src.project(&bad), Err(Error::Source(_))));
        let fixed = src.without_projection();
        assert_eq!(fixed.project(&bad).unwrap(), None);
    }

    #[test]
    fn rejects_mismatched_partitions() {
        let other = Array::from_json(Form::primitive(DataType::Int64), &[json!(1)]).unwrap();
        assert!(MemorySource::new("bad", xy(), vec![other]).is_err());
        assert!(MemorySource::new("bad", xy(), vec![Array::typetracer(xy())]).is_err());
    }
}
