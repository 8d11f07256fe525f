//! Error types shared by the image view, boundary, neighborhood and framework modules.
//!
//! Errors are grouped by kind so callers can tell a bad argument apart from a
//! feature that does not exist:
//!
//! | Kind | Typical cause |
//! |------|---------------|
//! | Precondition | Unforged image, wrong array length, non-scalar mask |
//! | Parameter | Unknown boundary condition or shape name, bad metric image |
//! | Shape | Sizes that cannot be joined by singleton expansion |
//! | Unimplemented | Higher-order extrapolation, unsupported option combination |
//! | Allocation | Sample storage could not be allocated |

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Parameter,
    Shape,
    Unimplemented,
    Allocation,
}

/// Errors raised by this crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The image has no sample storage attached.
    #[error("image is not forged")]
    ImageNotForged,

    /// An array parameter does not match the image dimensionality.
    #[error("array parameter has the wrong length: expected {expected}, got {actual}")]
    ArrayWrongLength { expected: usize, actual: usize },

    /// An array parameter that must have at least one element was empty.
    #[error("array parameter is empty")]
    ArrayEmpty,

    /// A coordinate or index lies outside the valid range.
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    /// Any other violated precondition.
    #[error("{0}")]
    Precondition(String),

    /// An invalid or unrecognised parameter value.
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// Two images cannot be joined by singleton expansion.
    #[error("sizes don't match: {0:?} vs {1:?}")]
    SizesDontMatch(Vec<usize>, Vec<usize>),

    /// Dimensionalities differ where they must agree.
    #[error("dimensionalities don't match: {0} vs {1}")]
    DimensionalityMismatch(usize, usize),

    /// The requested behavior is declared but not available.
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// Sample storage could not be allocated.
    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },
}

impl Error {
    /// Returns the kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ImageNotForged
            | Error::ArrayWrongLength { .. }
            | Error::ArrayEmpty
            | Error::IndexOutOfRange(_)
            | Error::Precondition(_) => ErrorKind::Precondition,
            Error::Parameter(_) => ErrorKind::Parameter,
            Error::SizesDontMatch(..) | Error::DimensionalityMismatch(..) => ErrorKind::Shape,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
            Error::Allocation { .. } => ErrorKind::Allocation,
        }
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    pub(crate) fn parameter(msg: impl Into<String>) -> Self {
        Error::Parameter(msg.into())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Broadcasts a per-dimension parameter array to `n_dims` elements.
///
/// An array with one element is repeated for all dimensions. An array that
/// already has `n_dims` elements is left alone. Anything else is an error.
pub fn array_use_parameter<T: Clone>(array: &mut Vec<T>, n_dims: usize) -> Result<()> {
    if array.len() == n_dims {
        return Ok(());
    }
    if array.len() == 1 {
        let value = array[0].clone();
        array.resize(n_dims, value);
        return Ok(());
    }
    if array.is_empty() {
        return Err(Error::ArrayEmpty);
    }
    Err(Error::ArrayWrongLength {
        expected: n_dims,
        actual: array.len(),
    })
}

/// Like [`array_use_parameter`], but an empty array becomes `n_dims` copies of `default`.
pub fn array_use_parameter_or<T: Clone>(array: &mut Vec<T>, n_dims: usize, default: T) -> Result<()> {
    if array.is_empty() {
        array.resize(n_dims, default);
        return Ok(());
    }
    array_use_parameter(array, n_dims)
}
