use snafu::Snafu;
use tessera_dtype::DType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    // =========================================================================
    // Construction
    // =========================================================================
    /// Array-like or boolean entry handed to a basic indexing operator.
    #[snafu(display("invalid index for basic indexing: {reason}"))]
    AdvancedIndexing { reason: String },

    /// Float or complex value used where an integer index is required.
    #[snafu(display("indices must be integers or boolean masks, got {dtype}"))]
    IndexType { dtype: DType },

    #[snafu(display("too many indices for array: array is {ndim}-dimensional, but {count} were indexed"))]
    TooManyIndices { ndim: usize, count: usize },

    /// Runtime inputs do not fill the symbolic slots of the descriptor list.
    #[snafu(display("{op} expects {expected} index inputs, got {actual}"))]
    IndexTemplateMismatch { op: String, expected: usize, actual: usize },

    #[snafu(display("cannot {action} a {target}-dimensional subtensor with a {value}-dimensional value"))]
    ValueRankTooHigh { action: &'static str, target: usize, value: usize },

    /// Casting the written value to the target's dtype would lose information.
    #[snafu(display("cannot {action} a {target} subtensor with a {value} value"))]
    ValueDType { action: &'static str, target: DType, value: DType },

    #[snafu(display("unsupported index: {reason}"))]
    UnsupportedIndex { reason: String },

    #[snafu(display("slice step cannot be zero"))]
    SliceStepZero,

    // =========================================================================
    // Execution
    // =========================================================================
    #[snafu(display("index {index} is out of bounds for axis {axis} with size {size}"))]
    IndexOutOfBounds { index: i64, axis: usize, size: usize },

    #[snafu(display(
        "boolean index did not match indexed array along axis {axis}; size of axis is {size} but size of corresponding boolean axis is {mask}"
    ))]
    BooleanIndexMismatch { axis: usize, size: usize, mask: usize },

    #[snafu(display("shape mismatch: indexing arrays could not be broadcast together with shapes {shapes:?}"))]
    IndexShapeMismatch { shapes: Vec<Vec<usize>> },

    /// The value would be broadcast along an axis its declared type does not mark as
    /// broadcastable.
    #[snafu(display(
        "runtime broadcasting not allowed in {op}: value axis {axis} has length 1 but is not declared broadcastable, and the target region has length {region}"
    ))]
    RuntimeBroadcast { op: String, axis: usize, region: usize },

    #[snafu(display("could not broadcast value of shape {value:?} into indexed region of shape {region:?}"))]
    ValueShapeMismatch { value: Vec<usize>, region: Vec<usize> },

    // =========================================================================
    // Graph layer
    // =========================================================================
    #[snafu(display("{source}"))]
    Ir { source: tessera_ir::Error },
}

impl Error {
    /// True for the graph layer's "not a compile-time constant" signal.
    pub fn is_not_constant(&self) -> bool {
        matches!(self, Error::Ir { source } if source.is_not_constant())
    }
}

impl From<tessera_ir::Error> for Error {
    fn from(err: tessera_ir::Error) -> Self {
        match err {
            tessera_ir::Error::Operator { source } => match source.downcast::<Error>() {
                Ok(inner) => *inner,
                Err(source) => Error::Ir { source: tessera_ir::Error::Operator { source } },
            },
            source => Error::Ir { source },
        }
    }
}

impl From<Error> for tessera_ir::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Ir { source } => source,
            other => tessera_ir::Error::operator(other),
        }
    }
}
