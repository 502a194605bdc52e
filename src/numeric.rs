//! Closure-backed numeric representation.
//!
//! The simplest way to wrap plain numeric code as a differentiable
//! function: a zero-order closure plus optional forward and adjoint
//! closures. Sweeps without a supplied closure surface
//! [`Error::UnsupportedOperation`](crate::Error::UnsupportedOperation),
//! and bit-level sparsity propagation is never available, so Jacobian
//! sparsity falls back to dense.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::repr::{check_shapes, Representation, ReprKind};

/// Zero-order evaluation closure: inputs to outputs.
pub type EvalFn<F> = dyn Fn(&[Buffer<F>], &mut [Buffer<F>]) -> Result<()> + Send + Sync;

/// Directional-derivative closure: `(inputs, outputs, seeds, sens)`.
pub type DirFn<F> =
    dyn Fn(&[Buffer<F>], &[Buffer<F>], &[Buffer<F>], &mut [Buffer<F>]) -> Result<()> + Send + Sync;

/// Numeric representation built from closures over buffers.
pub struct NumericFn<F: Float> {
    input_shapes: Vec<(usize, usize)>,
    output_shapes: Vec<(usize, usize)>,
    eval: Box<EvalFn<F>>,
    fwd: Option<Box<DirFn<F>>>,
    adj: Option<Box<DirFn<F>>>,
}

impl<F: Float> NumericFn<F> {
    /// Wrap a zero-order closure with the given slot shapes.
    pub fn new(
        input_shapes: Vec<(usize, usize)>,
        output_shapes: Vec<(usize, usize)>,
        eval: impl Fn(&[Buffer<F>], &mut [Buffer<F>]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        NumericFn {
            input_shapes,
            output_shapes,
            eval: Box::new(eval),
            fwd: None,
            adj: None,
        }
    }

    /// Attach a forward directional-derivative closure.
    ///
    /// The closure receives one seed buffer per input slot and writes
    /// one sensitivity buffer per output slot, for a single direction.
    pub fn with_forward(
        mut self,
        fwd: impl Fn(&[Buffer<F>], &[Buffer<F>], &[Buffer<F>], &mut [Buffer<F>]) -> Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.fwd = Some(Box::new(fwd));
        self
    }

    /// Attach an adjoint directional-derivative closure.
    ///
    /// The closure receives one seed buffer per output slot and writes
    /// one sensitivity buffer per input slot, for a single direction.
    pub fn with_adjoint(
        mut self,
        adj: impl Fn(&[Buffer<F>], &[Buffer<F>], &[Buffer<F>], &mut [Buffer<F>]) -> Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.adj = Some(Box::new(adj));
        self
    }

}

impl<F: Float> Representation<F> for NumericFn<F> {
    fn kind(&self) -> ReprKind {
        ReprKind::Numeric
    }

    fn input_shapes(&self) -> &[(usize, usize)] {
        &self.input_shapes
    }

    fn output_shapes(&self) -> &[(usize, usize)] {
        &self.output_shapes
    }

    fn has_forward(&self) -> bool {
        self.fwd.is_some()
    }

    fn has_adjoint(&self) -> bool {
        self.adj.is_some()
    }

    fn eval(&self, inputs: &[Buffer<F>], outputs: &mut [Buffer<F>]) -> Result<()> {
        check_shapes(inputs, &self.input_shapes)?;
        check_shapes(outputs, &self.output_shapes)?;
        (self.eval)(inputs, outputs)
    }

    fn eval_forward(
        &self,
        inputs: &[Buffer<F>],
        outputs: &[Buffer<F>],
        seeds: &[Buffer<F>],
        sens: &mut [Buffer<F>],
    ) -> Result<()> {
        let fwd = self
            .fwd
            .as_ref()
            .ok_or(Error::UnsupportedOperation("numeric forward sweep"))?;
        check_shapes(seeds, &self.input_shapes)?;
        check_shapes(sens, &self.output_shapes)?;
        fwd(inputs, outputs, seeds, sens)
    }

    fn eval_adjoint(
        &self,
        inputs: &[Buffer<F>],
        outputs: &[Buffer<F>],
        seeds: &[Buffer<F>],
        sens: &mut [Buffer<F>],
    ) -> Result<()> {
        let adj = self
            .adj
            .as_ref()
            .ok_or(Error::UnsupportedOperation("numeric adjoint sweep"))?;
        check_shapes(seeds, &self.output_shapes)?;
        check_shapes(sens, &self.input_shapes)?;
        adj(inputs, outputs, seeds, sens)
    }
}
