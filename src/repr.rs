//! The representation contract.
//!
//! A [`Representation`] is one way of carrying out "the same"
//! computation: plain numeric code, a scalar expression graph, or a
//! matrix expression graph. The evaluation dispatcher and the sparsity
//! propagator are written once against this trait and never against a
//! concrete representation; the core never inspects graph internals.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::float::Float;

/// Tag identifying which representation backs a function instance.
///
/// Carried inside [`Error::Evaluation`](crate::Error::Evaluation) so a
/// failing pass names its origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReprKind {
    /// Plain numeric code (closures over buffers).
    Numeric,
    /// Scalar expression graph, one node per scalar operation.
    ScalarGraph,
    /// Matrix expression graph; supplied by external collaborators,
    /// never constructed by this crate.
    MatrixGraph,
}

/// One scalar-entry dependency word per buffer entry.
///
/// Each bit traces one seeded structural nonzero, so a single
/// propagation sweep carries up to 64 seed directions at once.
pub type DepWords = [u64];

/// Validate a buffer slice against the slot shapes of one side: the
/// counts must match and every buffer must carry its slot's shape.
pub(crate) fn check_shapes<F: Float>(
    bufs: &[Buffer<F>],
    shapes: &[(usize, usize)],
) -> Result<()> {
    if bufs.len() != shapes.len() {
        return Err(Error::ShapeError(format!(
            "expected {} slot buffers, got {}",
            shapes.len(),
            bufs.len()
        )));
    }
    for (buf, &shape) in bufs.iter().zip(shapes) {
        if buf.shape() != shape {
            return Err(Error::DimensionMismatch {
                expected: shape,
                got: buf.shape(),
            });
        }
    }
    Ok(())
}

/// Capability contract every representation implements.
///
/// `eval_forward` and `eval_adjoint` handle exactly one direction; the
/// dispatcher loops over active directions, which keeps distinct
/// directions from ever reading each other's buffers. Inputs are always
/// passed by shared reference: no representation may mutate its inputs
/// during evaluation.
pub trait Representation<F: Float>: Send + Sync {
    /// Which kind of representation this is.
    fn kind(&self) -> ReprKind;

    /// Shape of every input slot, in slot order.
    fn input_shapes(&self) -> &[(usize, usize)];

    /// Shape of every output slot, in slot order.
    fn output_shapes(&self) -> &[(usize, usize)];

    /// Zero-order pass: map input values to output values.
    fn eval(&self, inputs: &[Buffer<F>], outputs: &mut [Buffer<F>]) -> Result<()>;

    /// Forward directional derivative for one direction.
    ///
    /// `seeds` holds one buffer per input slot, `sens` one per output
    /// slot. `outputs` carries the zero-order results of a preceding
    /// [`eval`](Representation::eval) call so intermediates may be
    /// shared where the representation allows it.
    fn eval_forward(
        &self,
        inputs: &[Buffer<F>],
        outputs: &[Buffer<F>],
        seeds: &[Buffer<F>],
        sens: &mut [Buffer<F>],
    ) -> Result<()>;

    /// Adjoint directional derivative for one direction.
    ///
    /// `seeds` holds one buffer per output slot, `sens` one per input
    /// slot; sensitivities are accumulated in reverse dependency order.
    fn eval_adjoint(
        &self,
        inputs: &[Buffer<F>],
        outputs: &[Buffer<F>],
        seeds: &[Buffer<F>],
        sens: &mut [Buffer<F>],
    ) -> Result<()>;

    /// Whether forward sweeps are available. Lets derivative builders
    /// pick a sweep direction up front instead of probing with a call
    /// that would fail.
    fn has_forward(&self) -> bool {
        true
    }

    /// Whether adjoint sweeps are available.
    fn has_adjoint(&self) -> bool {
        true
    }

    /// Whether bit-level dependency propagation is available in the
    /// requested direction. Callers fall back to dense sparsity when
    /// this reports `false`.
    fn can_propagate(&self, _forward: bool) -> bool {
        false
    }

    /// Propagate dependency words through the computation.
    ///
    /// Forward: reads input words, overwrites output words. Backward:
    /// reads output words, accumulates into input words. A bit is set
    /// in a downstream word if and only if the entry is a (possibly
    /// over-approximated) function of the seeded entry;
    /// under-approximation is a correctness bug.
    fn propagate(
        &self,
        _input_dep: &mut [&mut DepWords],
        _output_dep: &mut [&mut DepWords],
        _forward: bool,
    ) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "bit-level sparsity propagation",
        ))
    }

    /// Symbolically differentiate output `oind` with respect to input
    /// `iind`, producing a new representation whose single output is
    /// the Jacobian block. Representations without a symbolic form
    /// return `None`; the derivative builder then falls back to seeded
    /// evaluation.
    fn derive(&self, _iind: usize, _oind: usize) -> Option<Box<dyn Representation<F>>> {
        None
    }
}
