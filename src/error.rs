//! Error types shared by every tensor operation.
//!
//! All failures are synchronous: an operation either produces a complete
//! output tensor or returns one of these errors to its immediate caller.
//! Nothing is retried and no partially built graph is left behind.

use thiserror::Error;

/// Everything that can go wrong while building or differentiating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    /// Operand shapes disagree (element-wise ops, matmul inner dimension,
    /// or an explicit gradient passed to `backward_with`).
    #[error("{op}: shape mismatch between {left:?} and {right:?}")]
    ShapeMismatch {
        /// Operation that rejected the operands.
        op: &'static str,
        /// Shape of the left operand.
        left: Vec<usize>,
        /// Shape of the right operand.
        right: Vec<usize>,
    },

    /// The operation is only defined for a specific rank.
    #[error("{op}: expected rank {expected}, got rank {actual}")]
    UnsupportedRank {
        /// Operation that rejected the operand.
        op: &'static str,
        /// Rank the operation supports.
        expected: usize,
        /// Rank that was supplied.
        actual: usize,
    },

    /// `backward()` without an explicit gradient on a non-scalar tensor.
    #[error("backward without an explicit gradient requires a scalar, got shape {shape:?}")]
    MissingGradientForNonScalar {
        /// Shape of the offending tensor.
        shape: Vec<usize>,
    },

    /// A single value was requested from a tensor with several elements.
    #[error("expected a single-element tensor, got shape {shape:?}")]
    NotScalar {
        /// Shape of the offending tensor.
        shape: Vec<usize>,
    },

    /// A flat buffer does not hold exactly `prod(shape)` elements.
    #[error("shape {shape:?} is incompatible with {len} data elements")]
    InvalidShape {
        /// Requested shape.
        shape: Vec<usize>,
        /// Number of elements actually supplied.
        len: usize,
    },

    /// Nested data whose sublists do not share a common shape.
    #[error("ragged tensor data (rows have mismatched shapes)")]
    RaggedData,

    /// Malformed nested-array text.
    #[error("failed to parse tensor literal: {0}")]
    Parse(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TensorError>;
