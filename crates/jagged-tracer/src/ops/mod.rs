//! The closed set of array operations.
//!
//! Each operation computes its result form first (shared by tracers and
//! concrete arrays), then either records touches and returns a tracer, or
//! runs the row kernel. [`Op::apply`] is the single dispatch point used by
//! graph layers; the free functions are the same code for direct callers.

mod binary;
mod field;
mod reduce;
mod structure;

pub use binary::{binary, binary_form, promote, unary, unary_form, BinaryOp, UnaryOp};
pub use field::{field, field_form};
pub use reduce::{combine, partial, reduce, ReduceAxis, Reducer};
pub use structure::{fill_none, filter, flatten, is_none, length, num, record};

use jagged_core::{Error, Result, Scalar};
use serde::{Deserialize, Serialize};

use crate::array::{Array, Datum};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Extract a record field, looking through lists and options.
    Field(String),
    /// Elementwise binary operation on two operands.
    Binary(BinaryOp),
    /// Elementwise binary operation with a literal right operand.
    BinaryScalar(BinaryOp, Scalar),
    Unary(UnaryOp),
    /// Zip operands into a record with these field names.
    Record(Vec<String>),
    /// Lengths of the lists at `axis` (>= 1).
    Num(i64),
    /// Row count as a scalar.
    Length,
    /// Remove one level of nesting at `axis` (>= 1).
    Flatten(i64),
    /// Keep rows (or nested items) where the mask operand is true.
    Filter,
    IsNone,
    FillNone(Scalar),
    Reduce {
        reducer: Reducer,
        axis: Option<i64>,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Field(_) => "field",
            Op::Binary(_) | Op::BinaryScalar(..) => "binary",
            Op::Unary(_) => "unary",
            Op::Record(_) => "record",
            Op::Num(_) => "num",
            Op::Length => "length",
            Op::Flatten(_) => "flatten",
            Op::Filter => "filter",
            Op::IsNone => "is_none",
            Op::FillNone(_) => "fill_none",
            Op::Reduce { reducer, .. } => reducer.name(),
        }
    }

    /// Number of operands the operation takes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Binary(_) | Op::Filter => 2,
            Op::Record(names) => names.len(),
            _ => 1,
        }
    }

    /// Run the operation on tracers or concrete data alike.
    pub fn apply(&self, args: &[Datum]) -> Result<Datum> {
        let n = self.arity();
        if args.len() != n {
            return Err(Error::InvalidValue(format!(
                "{} takes {n} operand(s), got {}",
                self.name(),
                args.len()
            )));
        }
        match self {
            Op::Field(name) => field(args[0].as_array()?, name).map(Datum::Array),
            Op::Binary(op) => binary(*op, &args[0], &args[1]),
            Op::BinaryScalar(op, value) => {
                let rhs = scalar_operand(value)?;
                binary(*op, &args[0], &rhs)
            }
            Op::Unary(op) => unary(*op, &args[0]),
            Op::Record(names) => {
                let arrays = args.iter().map(Datum::as_array).collect::<Result<Vec<_>>>()?;
                let pairs: Vec<(&str, &Array)> = names.iter().map(String::as_str).zip(arrays).collect();
                record(&pairs).map(Datum::Array)
            }
            Op::Num(axis) => num(args[0].as_array()?, *axis).map(Datum::Array),
            Op::Length => length(args[0].as_array()?).map(Datum::Scalar),
            Op::Flatten(axis) => flatten(args[0].as_array()?, *axis).map(Datum::Array),
            Op::Filter => filter(args[0].as_array()?, args[1].as_array()?).map(Datum::Array),
            Op::IsNone => is_none(args[0].as_array()?).map(Datum::Array),
            Op::FillNone(value) => fill_none(args[0].as_array()?, value).map(Datum::Array),
            Op::Reduce { reducer, axis } => reduce(&args[0], *reducer, *axis),
        }
    }
}

/// Literal operand for a binary operation.
pub fn scalar_operand(value: &Scalar) -> Result<Datum> {
    let dtype = value.data_type().ok_or_else(|| {
        Error::InvalidValue("a null literal has no type to broadcast".into())
    })?;
    crate::array::TypedScalar::known(jagged_core::Form::primitive(dtype), value.clone())
        .map(Datum::Scalar)
}

/// Combined length of array operands; concrete or known lengths must agree.
pub(crate) fn joint_length(arrays: &[&Array]) -> Result<Option<usize>> {
    let mut out: Option<usize> = None;
    for a in arrays {
        if let Some(n) = a.known_len() {
            match out {
                Some(m) if m != n => {
                    return Err(Error::Data(format!(
                        "cannot broadcast arrays of length {m} and {n}"
                    )))
                }
                _ => out = Some(n),
            }
        }
    }
    Ok(out)
}

/// Convenience methods mirroring the free functions.
impl Array {
    pub fn field(&self, name: &str) -> Result<Array> {
        field(self, name)
    }

    pub fn binary(&self, op: BinaryOp, other: &Array) -> Result<Array> {
        binary(op, &Datum::Array(self.clone()), &Datum::Array(other.clone()))?.into_array()
    }

    pub fn binary_scalar(&self, op: BinaryOp, value: Scalar) -> Result<Array> {
        let rhs = scalar_operand(&value)?;
        binary(op, &Datum::Array(self.clone()), &rhs)?.into_array()
    }

    pub fn num(&self, axis: i64) -> Result<Array> {
        num(self, axis)
    }

    pub fn reduce(&self, reducer: Reducer, axis: Option<i64>) -> Result<Datum> {
        reduce(&Datum::Array(self.clone()), reducer, axis)
    }
}
