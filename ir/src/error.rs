use snafu::Snafu;
use tessera_dtype::DType;

use crate::shape::{Dim, StaticShape};
use crate::types::{BinaryOp, UnaryOp};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error raised by an operator implemented outside this crate.
pub type OperatorError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    // =========================================================================
    // Scalar expressions
    // =========================================================================
    /// A symbol had no value bound when the expression was evaluated.
    #[snafu(display("symbol {name:?} is not bound"))]
    UnboundSymbol { name: String },

    /// Division by zero.
    #[snafu(display("division by zero"))]
    DivisionByZero,

    #[snafu(display("invalid operand for {operation:?}: {dtype}"))]
    InvalidOperandForUnaryOp { operation: UnaryOp, dtype: DType },

    #[snafu(display("invalid operands for {operation:?}: {lhs} and {rhs}"))]
    InvalidOperandForBinaryOp { operation: BinaryOp, lhs: DType, rhs: DType },

    /// The value is only known symbolically.
    ///
    /// This is a signal rather than a failure: callers that can fall back to symbolic
    /// reasoning test for it with [`Error::is_not_constant`].
    #[snafu(display("value is not a scalar constant"))]
    NotScalarConstant,

    // =========================================================================
    // Shapes
    // =========================================================================
    #[snafu(display("cannot broadcast dimension {lhs} against {rhs} at axis {axis}"))]
    BroadcastShapeMismatch { axis: usize, lhs: Dim, rhs: Dim },

    #[snafu(display("cannot broadcast concrete shapes {lhs:?} and {rhs:?}"))]
    RuntimeBroadcastMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    /// Concrete output disagrees with the type declared when the node was built.
    #[snafu(display("{op} produced shape {actual:?}, declared {expected:?}"))]
    RuntimeShapeMismatch { op: String, expected: StaticShape, actual: Vec<usize> },

    #[snafu(display("axis {axis} is out of range for rank {ndim}"))]
    AxisOutOfRange { axis: usize, ndim: usize },

    #[snafu(display("axis {axis} of {shape:?} is not broadcastable and cannot be dropped"))]
    DropNonBroadcastable { axis: usize, shape: StaticShape },

    #[snafu(display("cannot reshape {size} elements into {shape:?}"))]
    ReshapeSizeMismatch { size: usize, shape: Vec<usize> },

    // =========================================================================
    // DTypes
    // =========================================================================
    #[snafu(display("dtype mismatch: expected {expected}, got {actual}"))]
    DTypeMismatch { expected: DType, actual: DType },

    #[snafu(display("{operation} does not support dtype {dtype}"))]
    UnsupportedDType { dtype: DType, operation: &'static str },

    #[snafu(display("cannot cast {from} to {to} without losing values"))]
    UnsafeCast { from: DType, to: DType },

    // =========================================================================
    // Graph
    // =========================================================================
    #[snafu(display("{op} expects {expected} inputs, got {actual}"))]
    InputCountMismatch { op: String, expected: usize, actual: usize },

    #[snafu(display("{op} input {index} has rank {actual}, expected {expected}"))]
    InputRankMismatch { op: String, index: usize, expected: usize, actual: usize },

    #[snafu(display("no value given for input {name}"))]
    MissingInput { name: String },

    /// An in-place operator consumed a buffer that is needed again.
    #[snafu(display("value of {name} was destroyed by an in-place operator"))]
    DestroyedValue { name: String },

    #[snafu(display("{op} does not define a gradient"))]
    GradientUndefined { op: String },

    #[snafu(display("{op} cannot be batched: {reason}"))]
    NotVectorizable { op: String, reason: String },

    /// Failure raised by an operator defined in a downstream crate.
    #[snafu(display("{source}"))]
    Operator { source: OperatorError },
}

impl Error {
    /// True for the "not a compile-time constant" signal.
    pub fn is_not_constant(&self) -> bool {
        matches!(self, Error::NotScalarConstant)
    }

    /// Wrap a downstream operator error.
    pub fn operator(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Operator { source: Box::new(source) }
    }
}
