//! The generic function instance and its evaluation dispatcher.
//!
//! A [`Function`] couples an immutable, shareable representation with
//! its own slot store and lifecycle state. One evaluation call runs to
//! completion before another may begin on the same instance (all
//! directions share the instance's buffers); independent instances may
//! run concurrently because representations are immutable and sparsity
//! patterns are read-only after construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::repr::Representation;
use crate::scheme::IoScheme;
use crate::slots::{SensMode, SlotKind, SlotStore};
use crate::sparsity::Sparsity;

/// Lifecycle of a function instance.
///
/// `Uninitialized → Initializing → Ready`, never backwards. Evaluation,
/// derivative construction and sparsity queries require `Ready`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A multi-input, multi-output differentiable function.
pub struct Function<F: Float> {
    pub(crate) repr: Arc<dyn Representation<F>>,
    pub(crate) store: SlotStore<F>,
    state: FunctionState,
    input_scheme: Option<IoScheme>,
    output_scheme: Option<IoScheme>,
    /// Jacobian sparsity memo, keyed by `(iind, oind, compact)`.
    /// Patterns are immutable once inserted; the lock only serializes
    /// construction.
    pub(crate) jac_cache: Mutex<HashMap<(usize, usize, bool), Arc<Sparsity>>>,
}

impl<F: Float> Function<F> {
    /// Wrap a representation. The instance starts `Uninitialized`;
    /// configure direction counts and schemes, then call
    /// [`init`](Function::init).
    pub fn new(repr: impl Representation<F> + 'static) -> Self {
        Self::from_arc(Arc::new(repr))
    }

    /// Wrap an already-shared representation.
    pub fn from_arc(repr: Arc<dyn Representation<F>>) -> Self {
        let store = SlotStore::new(repr.input_shapes(), repr.output_shapes());
        Function {
            repr,
            store,
            state: FunctionState::Uninitialized,
            input_scheme: None,
            output_scheme: None,
            jac_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> FunctionState {
        self.state
    }

    pub fn num_inputs(&self) -> usize {
        self.store.num_inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.store.num_outputs()
    }

    /// Active forward direction count.
    pub fn num_fwd_dirs(&self) -> usize {
        self.store.num_fwd()
    }

    /// Active adjoint direction count.
    pub fn num_adj_dirs(&self) -> usize {
        self.store.num_adj()
    }

    fn configuring(&mut self) {
        if self.state == FunctionState::Uninitialized {
            self.state = FunctionState::Initializing;
        }
    }

    /// Grow the number of simultaneous derivative directions. Growing
    /// is permitted at any point in the lifecycle; shrinking requires
    /// the explicit [`reset_directions`](Function::reset_directions).
    /// Any previously borrowed sensitivity buffer references are
    /// invalidated.
    pub fn set_num_directions(&mut self, num_fwd: usize, num_adj: usize) {
        self.configuring();
        self.store.resize(num_fwd, num_adj);
    }

    /// Explicitly drop derivative directions down to the given counts.
    pub fn reset_directions(&mut self, num_fwd: usize, num_adj: usize) {
        self.store.shrink(num_fwd, num_adj);
    }

    /// Attach a naming scheme for input slots.
    pub fn set_input_scheme(&mut self, scheme: IoScheme) {
        self.configuring();
        self.input_scheme = Some(scheme);
    }

    /// Attach a naming scheme for output slots.
    pub fn set_output_scheme(&mut self, scheme: IoScheme) {
        self.configuring();
        self.output_scheme = Some(scheme);
    }

    /// Finish one-time structural initialization. Idempotent once
    /// `Ready`; there is no way back to the configuration phase.
    pub fn init(&mut self) -> Result<()> {
        self.state = FunctionState::Ready;
        Ok(())
    }

    pub(crate) fn assert_ready(&self) -> Result<()> {
        if self.state != FunctionState::Ready {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    /// Resolve an input slot name via the attached scheme.
    pub fn input_index(&self, name: &str) -> Result<usize> {
        match &self.input_scheme {
            Some(s) => s
                .index_of(name)
                .ok_or_else(|| Error::ShapeError(format!("unknown input name: {name}"))),
            None => Err(Error::UnsupportedOperation("input naming scheme")),
        }
    }

    /// Resolve an output slot name via the attached scheme.
    pub fn output_index(&self, name: &str) -> Result<usize> {
        match &self.output_scheme {
            Some(s) => s
                .index_of(name)
                .ok_or_else(|| Error::ShapeError(format!("unknown output name: {name}"))),
            None => Err(Error::UnsupportedOperation("output naming scheme")),
        }
    }

    /// Input value buffer.
    pub fn input(&self, iind: usize) -> Result<&Buffer<F>> {
        self.store.value(SlotKind::Input, iind)
    }

    /// Mutable input value buffer.
    pub fn input_mut(&mut self, iind: usize) -> Result<&mut Buffer<F>> {
        self.store.value_mut(SlotKind::Input, iind)
    }

    /// Output value buffer (filled by the last evaluation).
    pub fn output(&self, oind: usize) -> Result<&Buffer<F>> {
        self.store.value(SlotKind::Output, oind)
    }

    /// Set an input from a flat slice.
    pub fn set_input(&mut self, iind: usize, values: &[F]) -> Result<()> {
        self.store.value_mut(SlotKind::Input, iind)?.assign(values)
    }

    /// Forward seed buffer of input `iind`, direction `dir`.
    ///
    /// For a row-shaped slot the seed is stored transposed relative to
    /// the column convention (same entry order, same shape as the
    /// slot), which every representation accounts for uniformly.
    pub fn fwd_seed_mut(&mut self, iind: usize, dir: usize) -> Result<&mut Buffer<F>> {
        self.store
            .sensitivity_mut(SlotKind::Input, iind, SensMode::Forward, dir)
    }

    /// Set a forward seed from a flat slice.
    pub fn set_fwd_seed(&mut self, iind: usize, dir: usize, values: &[F]) -> Result<()> {
        self.fwd_seed_mut(iind, dir)?.assign(values)
    }

    /// Forward sensitivity of output `oind`, direction `dir`.
    pub fn fwd_sens(&self, oind: usize, dir: usize) -> Result<&Buffer<F>> {
        self.store
            .sensitivity(SlotKind::Output, oind, SensMode::Forward, dir)
    }

    /// Adjoint seed buffer of output `oind`, direction `dir`.
    pub fn adj_seed_mut(&mut self, oind: usize, dir: usize) -> Result<&mut Buffer<F>> {
        self.store
            .sensitivity_mut(SlotKind::Output, oind, SensMode::Adjoint, dir)
    }

    /// Set an adjoint seed from a flat slice.
    pub fn set_adj_seed(&mut self, oind: usize, dir: usize, values: &[F]) -> Result<()> {
        self.adj_seed_mut(oind, dir)?.assign(values)
    }

    /// Adjoint sensitivity of input `iind`, direction `dir`.
    pub fn adj_sens(&self, iind: usize, dir: usize) -> Result<&Buffer<F>> {
        self.store
            .sensitivity(SlotKind::Input, iind, SensMode::Adjoint, dir)
    }

    /// Evaluate: zero-order pass, then `nfwd` forward and `nadj`
    /// adjoint directional sweeps.
    ///
    /// Each direction is propagated independently; no direction reads
    /// another's buffers, so results do not depend on sweep order.
    /// After a failed call all output and sensitivity buffers are
    /// unspecified.
    pub fn evaluate(&mut self, nfwd: usize, nadj: usize) -> Result<()> {
        self.evaluate_with(nfwd, nadj, false)
    }

    /// [`evaluate`](Function::evaluate) with an `output_given` switch:
    /// when `true` the zero-order pass is skipped and the current
    /// output buffers are trusted as already computed at the current
    /// inputs.
    pub fn evaluate_with(&mut self, nfwd: usize, nadj: usize, output_given: bool) -> Result<()> {
        self.assert_ready()?;
        if nfwd > self.store.num_fwd() {
            return Err(Error::out_of_range(
                "forward direction",
                nfwd,
                self.store.num_fwd(),
            ));
        }
        if nadj > self.store.num_adj() {
            return Err(Error::out_of_range(
                "adjoint direction",
                nadj,
                self.store.num_adj(),
            ));
        }

        if !output_given {
            self.repr
                .eval(&self.store.input.values, &mut self.store.output.values)?;
        }

        for d in 0..nfwd {
            self.repr.eval_forward(
                &self.store.input.values,
                &self.store.output.values,
                &self.store.input.fwd[d],
                &mut self.store.output.fwd[d],
            )?;
        }

        for d in 0..nadj {
            for buf in &mut self.store.input.adj[d] {
                buf.fill_zero();
            }
            self.repr.eval_adjoint(
                &self.store.input.values,
                &self.store.output.values,
                &self.store.output.adj[d],
                &mut self.store.input.adj[d],
            )?;
        }
        Ok(())
    }
}
