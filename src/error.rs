//! Error taxonomy shared by evaluation, sparsity propagation and
//! derivative construction.

use thiserror::Error;

use crate::repr::ReprKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong in this core.
///
/// All errors are reported synchronously to the immediate caller and
/// nothing is retried: evaluation is deterministic, so a failed call is
/// expected to fail identically until caller-visible state changes.
/// After any failed call the contents of output and sensitivity buffers
/// are unspecified.
#[derive(Debug, Error)]
pub enum Error {
    /// Evaluation or derivative construction requested before the
    /// function instance reached the `Ready` state. Fatal to the call,
    /// not to the instance.
    #[error("function has not been initialized")]
    NotInitialized,

    /// A buffer or seed has a shape that disagrees with its slot.
    #[error("dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A requested derivative block has an unusable shape (e.g. a
    /// Jacobian of a non-column-shaped slot).
    #[error("shape error: {0}")]
    ShapeError(String),

    /// Slot or direction index outside the current configuration.
    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A capability the active representation or backend does not
    /// offer (e.g. transposed solves, bit-level propagation, symbolic
    /// differentiation).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// The underlying representation failed during a pass.
    #[error("evaluation failed in {kind:?} representation at slot {slot}: {message}")]
    Evaluation {
        kind: ReprKind,
        slot: usize,
        message: String,
    },
}

impl Error {
    /// Shorthand for an `OutOfRange` on a slot index.
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Error::OutOfRange { what, index, len }
    }
}
