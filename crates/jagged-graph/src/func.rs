//! Callables applied to partitions.

use std::fmt;
use std::sync::Arc;

use jagged_core::Result;
use jagged_tracer::{Datum, Op};

type Callable = dyn Fn(&[Datum]) -> Result<Datum> + Send + Sync;

/// A named function from partition inputs to one partition output.
///
/// The same function runs on tracers while the graph is built and on real
/// partitions at compute time.
#[derive(Clone)]
pub struct PartitionFn {
    label: String,
    f: Arc<Callable>,
}

impl PartitionFn {
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Datum]) -> Result<Datum> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    /// A built-in array operation.
    pub fn op(op: Op) -> Self {
        let label = op.name().to_string();
        Self::new(label, move |args| op.apply(args))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn call(&self, args: &[Datum]) -> Result<Datum> {
        (self.f)(args)
    }

    /// `self` followed by `next`, which receives `self`'s output as its only
    /// argument.
    pub fn then(&self, next: &PartitionFn) -> PartitionFn {
        let first = self.f.clone();
        let second = next.f.clone();
        PartitionFn {
            label: format!("{}+{}", self.label, next.label),
            f: Arc::new(move |args| {
                let mid = first(args)?;
                second(std::slice::from_ref(&mid))
            }),
        }
    }
}

impl fmt::Debug for PartitionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PartitionFn").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jagged_core::{DataType, Form, Scalar};
    use jagged_tracer::{Array, BinaryOp};
    use serde_json::json;

    #[test]
    fn composition_feeds_output_forward() {
        let add = PartitionFn::op(Op::BinaryScalar(BinaryOp::Add, Scalar::I64(1)));
        let dbl = PartitionFn::op(Op::BinaryScalar(BinaryOp::Mul, Scalar::I64(2)));
        let both = add.then(&dbl);
        assert_eq!(both.label(), "binary+binary");

        let a = Array::from_json(Form::primitive(DataType::Int64), &[json!(1), json!(4)]).unwrap();
        let out = both.call(&[Datum::Array(a)]).unwrap().into_array().unwrap();
        assert_eq!(out.to_json().unwrap(), vec![json!(4), json!(10)]);
    }
}
