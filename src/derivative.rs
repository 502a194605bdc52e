//! Jacobian and Hessian construction.
//!
//! A derivative object is just another [`Function`]: the builder either
//! asks the representation to differentiate itself symbolically
//! ([`Representation::derive`]) or wraps a seeded evaluator that drives
//! the parent with unit seeds, one structurally nonzero column or row
//! at a time. Because the result is an ordinary function instance,
//! Hessians are the same builder applied twice.

use std::sync::{Arc, Mutex};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::function::Function;
use crate::repr::{Representation, ReprKind};
use crate::sparsity::Sparsity;

impl<F: Float> Function<F> {
    /// Build a function computing the dense Jacobian block of output
    /// `oind` with respect to input `iind`.
    ///
    /// Both slots must be column-shaped. The returned function takes
    /// the same inputs as this one and produces one `m x n` output.
    /// Structurally zero columns (or rows, in adjoint mode) are skipped
    /// using the propagated sparsity pattern.
    pub fn jacobian(&mut self, iind: usize, oind: usize) -> Result<Function<F>> {
        self.assert_ready()?;
        self.check_column_pair(iind, oind)?;

        if let Some(derived) = self.repr.derive(iind, oind) {
            let mut f = Function::from_arc(Arc::from(derived));
            f.init()?;
            return Ok(f);
        }

        let sparsity = self.jac_sparsity(iind, oind, false)?;
        let rep = JacobianRep::build(Arc::clone(&self.repr), iind, oind, sparsity)?;
        let mut f = Function::new(rep);
        f.init()?;
        Ok(f)
    }

    /// Build a function computing the Hessian of output `oind` (which
    /// must be scalar) with respect to input `iind`: the Jacobian of
    /// the Jacobian.
    ///
    /// Requires a representation that supports symbolic
    /// differentiation; seeded evaluation only carries first-order
    /// information, so there is no conservative fallback here.
    pub fn hessian(&mut self, iind: usize, oind: usize) -> Result<Function<F>> {
        self.assert_ready()?;
        if !self.output(oind)?.is_scalar() {
            return Err(Error::ShapeError(format!(
                "hessian requires a scalar output slot, output {oind} is {:?}",
                self.output(oind)?.shape()
            )));
        }
        if !self.input(iind)?.is_column() {
            return Err(Error::ShapeError(format!(
                "hessian requires a column-shaped input slot, input {iind} is {:?}",
                self.input(iind)?.shape()
            )));
        }

        let gradient = self
            .repr
            .derive(iind, oind)
            .ok_or(Error::UnsupportedOperation(
                "symbolic differentiation (required for Hessians)",
            ))?;
        // The gradient graph's single output holds the n first partials;
        // differentiating it again yields the n x n Hessian.
        let hess = gradient
            .derive(iind, 0)
            .ok_or(Error::UnsupportedOperation(
                "second-order symbolic differentiation",
            ))?;
        let mut f = Function::from_arc(Arc::from(hess));
        f.init()?;
        Ok(f)
    }

    /// Batched variant: one combined function evaluating several
    /// Jacobian blocks, in the requested order, optionally followed by
    /// the original outputs.
    pub fn jacobian_blocks(
        &mut self,
        blocks: &[(usize, usize)],
        include_outputs: bool,
    ) -> Result<Function<F>> {
        self.assert_ready()?;
        let mut parts: Vec<Box<dyn Representation<F>>> = Vec::with_capacity(blocks.len());
        for &(iind, oind) in blocks {
            self.check_column_pair(iind, oind)?;
            let part: Box<dyn Representation<F>> = match self.repr.derive(iind, oind) {
                Some(derived) => derived,
                None => {
                    let sparsity = self.jac_sparsity(iind, oind, false)?;
                    Box::new(JacobianRep::build(
                        Arc::clone(&self.repr),
                        iind,
                        oind,
                        sparsity,
                    )?)
                }
            };
            parts.push(part);
        }

        let original = include_outputs.then(|| Arc::clone(&self.repr));
        let mut f = Function::new(BlocksRep::new(parts, original, self.repr.input_shapes()));
        f.init()?;
        Ok(f)
    }

    fn check_column_pair(&self, iind: usize, oind: usize) -> Result<()> {
        if !self.input(iind)?.is_column() {
            return Err(Error::ShapeError(format!(
                "jacobian requires a column-shaped input slot, input {iind} is {:?}",
                self.input(iind)?.shape()
            )));
        }
        if !self.output(oind)?.is_column() {
            return Err(Error::ShapeError(format!(
                "jacobian requires a column-shaped output slot, output {oind} is {:?}",
                self.output(oind)?.shape()
            )));
        }
        Ok(())
    }
}

/// Seeded Jacobian evaluator for representations without a symbolic
/// form.
///
/// Owns a private sub-function over the shared parent representation
/// and, per evaluation, runs one unit-seeded sweep per structurally
/// nonzero column (forward) or row (adjoint). The mutex serializes the
/// sub-function per the one-call-at-a-time instance model.
struct JacobianRep<F: Float> {
    parent: Mutex<Function<F>>,
    kind: ReprKind,
    iind: usize,
    oind: usize,
    sparsity: Arc<Sparsity>,
    forward: bool,
    input_shapes: Vec<(usize, usize)>,
    output_shapes: Vec<(usize, usize)>,
}

impl<F: Float> JacobianRep<F> {
    fn build(
        repr: Arc<dyn Representation<F>>,
        iind: usize,
        oind: usize,
        sparsity: Arc<Sparsity>,
    ) -> Result<Self> {
        let n = sparsity.ncol();
        let m = sparsity.nrow();
        let cols_needed = (0..n).filter(|&c| !sparsity.column(c).is_empty()).count();
        let rows_needed = sparsity.transpose();
        let rows_needed = (0..m)
            .filter(|&r| !rows_needed.column(r).is_empty())
            .count();

        let forward = if repr.has_forward() && (!repr.has_adjoint() || cols_needed <= rows_needed) {
            true
        } else if repr.has_adjoint() {
            false
        } else {
            return Err(Error::UnsupportedOperation(
                "directional derivatives (required for seeded Jacobians)",
            ));
        };

        let input_shapes = repr.input_shapes().to_vec();
        let output_shapes = vec![(m, n)];
        let kind = repr.kind();

        let mut parent = Function::from_arc(repr);
        if forward {
            parent.set_num_directions(1, 0);
        } else {
            parent.set_num_directions(0, 1);
        }
        parent.init()?;

        Ok(JacobianRep {
            parent: Mutex::new(parent),
            kind,
            iind,
            oind,
            sparsity,
            forward,
            input_shapes,
            output_shapes,
        })
    }
}

impl<F: Float> Representation<F> for JacobianRep<F> {
    fn kind(&self) -> ReprKind {
        self.kind
    }

    fn input_shapes(&self) -> &[(usize, usize)] {
        &self.input_shapes
    }

    fn output_shapes(&self) -> &[(usize, usize)] {
        &self.output_shapes
    }

    fn has_forward(&self) -> bool {
        false
    }

    fn has_adjoint(&self) -> bool {
        false
    }

    fn eval(&self, inputs: &[Buffer<F>], outputs: &mut [Buffer<F>]) -> Result<()> {
        let mut parent = self.parent.lock().expect("jacobian parent lock poisoned");
        for (i, buf) in inputs.iter().enumerate() {
            parent.input_mut(i)?.assign_from(buf)?;
        }
        parent.evaluate(0, 0)?;

        let jac = &mut outputs[0];
        jac.fill_zero();
        let (m, n) = (self.sparsity.nrow(), self.sparsity.ncol());

        if self.forward {
            for c in 0..n {
                if self.sparsity.column(c).is_empty() {
                    continue;
                }
                parent.fwd_seed_mut(self.iind, 0)?.fill_zero();
                parent.fwd_seed_mut(self.iind, 0)?.as_mut_slice()[c] = F::one();
                parent.evaluate_with(1, 0, true)?;
                let sens = parent.fwd_sens(self.oind, 0)?;
                for r in 0..m {
                    jac.set(r, c, sens.as_slice()[r]);
                }
            }
        } else {
            for r in 0..m {
                if !(0..n).any(|c| self.sparsity.contains(r, c)) {
                    continue;
                }
                parent.adj_seed_mut(self.oind, 0)?.fill_zero();
                parent.adj_seed_mut(self.oind, 0)?.as_mut_slice()[r] = F::one();
                parent.evaluate_with(0, 1, true)?;
                let sens = parent.adj_sens(self.iind, 0)?;
                for c in 0..n {
                    jac.set(r, c, sens.as_slice()[c]);
                }
            }
        }
        Ok(())
    }

    fn eval_forward(
        &self,
        _inputs: &[Buffer<F>],
        _outputs: &[Buffer<F>],
        _seeds: &[Buffer<F>],
        _sens: &mut [Buffer<F>],
    ) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "differentiating a seeded Jacobian function",
        ))
    }

    fn eval_adjoint(
        &self,
        _inputs: &[Buffer<F>],
        _outputs: &[Buffer<F>],
        _seeds: &[Buffer<F>],
        _sens: &mut [Buffer<F>],
    ) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "differentiating a seeded Jacobian function",
        ))
    }
}

/// Combined evaluator for a batch of Jacobian blocks, optionally
/// followed by the original outputs.
struct BlocksRep<F: Float> {
    parts: Vec<Box<dyn Representation<F>>>,
    original: Option<Arc<dyn Representation<F>>>,
    input_shapes: Vec<(usize, usize)>,
    output_shapes: Vec<(usize, usize)>,
}

impl<F: Float> BlocksRep<F> {
    fn new(
        parts: Vec<Box<dyn Representation<F>>>,
        original: Option<Arc<dyn Representation<F>>>,
        input_shapes: &[(usize, usize)],
    ) -> Self {
        let mut output_shapes: Vec<(usize, usize)> =
            parts.iter().map(|p| p.output_shapes()[0]).collect();
        if let Some(orig) = &original {
            output_shapes.extend_from_slice(orig.output_shapes());
        }
        BlocksRep {
            parts,
            original,
            input_shapes: input_shapes.to_vec(),
            output_shapes,
        }
    }
}

impl<F: Float> Representation<F> for BlocksRep<F> {
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
        false
    }

    fn has_adjoint(&self) -> bool {
        false
    }

    fn eval(&self, inputs: &[Buffer<F>], outputs: &mut [Buffer<F>]) -> Result<()> {
        let (block_outs, rest) = outputs.split_at_mut(self.parts.len());
        for (part, out) in self.parts.iter().zip(block_outs) {
            part.eval(inputs, std::slice::from_mut(out))?;
        }
        if let Some(orig) = &self.original {
            orig.eval(inputs, rest)?;
        }
        Ok(())
    }

    fn eval_forward(
        &self,
        _inputs: &[Buffer<F>],
        _outputs: &[Buffer<F>],
        _seeds: &[Buffer<F>],
        _sens: &mut [Buffer<F>],
    ) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "differentiating a block-batch function",
        ))
    }

    fn eval_adjoint(
        &self,
        _inputs: &[Buffer<F>],
        _outputs: &[Buffer<F>],
        _seeds: &[Buffer<F>],
        _sens: &mut [Buffer<F>],
    ) -> Result<()> {
        Err(Error::UnsupportedOperation(
            "differentiating a block-batch function",
        ))
    }
}
