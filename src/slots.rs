//! Per-slot storage for values, directional sensitivities and
//! dependency words.
//!
//! The store is arena-style: buffers are allocated when a slot or a new
//! direction appears and reused across every subsequent evaluation.
//! Storage is direction-major (`fwd[dir][slot]`) so one derivative
//! sweep hands a representation a contiguous slice of buffers, one per
//! slot. Resizing the direction counts is the only operation that
//! invalidates previously borrowed buffer references.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::float::Float;

/// Which side of the function a slot sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Input,
    Output,
}

/// Which derivative sweep a sensitivity buffer belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensMode {
    /// Seeds on inputs, sensitivities on outputs.
    Forward,
    /// Seeds on outputs, sensitivities on inputs.
    Adjoint,
}

/// Storage for one side (all inputs or all outputs).
#[derive(Debug)]
pub(crate) struct Side<F: Float> {
    pub(crate) values: Vec<Buffer<F>>,
    /// `fwd[dir][slot]`, every buffer shaped like its slot's value.
    pub(crate) fwd: Vec<Vec<Buffer<F>>>,
    /// `adj[dir][slot]`, every buffer shaped like its slot's value.
    pub(crate) adj: Vec<Vec<Buffer<F>>>,
    /// One dependency word per entry, per slot.
    pub(crate) dep: Vec<Vec<u64>>,
}

impl<F: Float> Side<F> {
    fn new(shapes: &[(usize, usize)]) -> Self {
        Side {
            values: shapes.iter().map(|&(r, c)| Buffer::zeros(r, c)).collect(),
            fwd: Vec::new(),
            adj: Vec::new(),
            dep: shapes.iter().map(|&(r, c)| vec![0u64; r * c]).collect(),
        }
    }

    fn fresh_direction(&self) -> Vec<Buffer<F>> {
        self.values
            .iter()
            .map(|v| Buffer::zeros(v.nrow(), v.ncol()))
            .collect()
    }
}

/// Owns every input and output slot of one function instance.
///
/// No evaluation logic lives here; the store only hands out buffers
/// and grows direction storage on request.
#[derive(Debug)]
pub struct SlotStore<F: Float> {
    pub(crate) input: Side<F>,
    pub(crate) output: Side<F>,
    num_fwd: usize,
    num_adj: usize,
}

impl<F: Float> SlotStore<F> {
    /// Allocate slots for the given input and output shapes, with no
    /// derivative directions yet.
    pub fn new(input_shapes: &[(usize, usize)], output_shapes: &[(usize, usize)]) -> Self {
        SlotStore {
            input: Side::new(input_shapes),
            output: Side::new(output_shapes),
            num_fwd: 0,
            num_adj: 0,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.input.values.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.output.values.len()
    }

    /// Currently configured forward direction count.
    pub fn num_fwd(&self) -> usize {
        self.num_fwd
    }

    /// Currently configured adjoint direction count.
    pub fn num_adj(&self) -> usize {
        self.num_adj
    }

    /// Grow the sensitivity storage of every slot to the requested
    /// direction counts. Never shrinks: smaller counts leave existing
    /// buffers untouched, so repeating a resize is a no-op and buffer
    /// identities are stable. New buffers are zero-initialized.
    pub fn resize(&mut self, num_fwd: usize, num_adj: usize) {
        self.num_fwd = self.num_fwd.max(num_fwd);
        self.num_adj = self.num_adj.max(num_adj);
        for side in [&mut self.input, &mut self.output] {
            while side.fwd.len() < self.num_fwd {
                side.fwd.push(side.fresh_direction());
            }
            while side.adj.len() < self.num_adj {
                side.adj.push(side.fresh_direction());
            }
        }
    }

    /// Explicitly shrink the direction counts, dropping the trailing
    /// sensitivity buffers. The distinct, opt-in counterpart of
    /// [`resize`](SlotStore::resize).
    pub fn shrink(&mut self, num_fwd: usize, num_adj: usize) {
        self.num_fwd = self.num_fwd.min(num_fwd);
        self.num_adj = self.num_adj.min(num_adj);
        for side in [&mut self.input, &mut self.output] {
            side.fwd.truncate(self.num_fwd);
            side.adj.truncate(self.num_adj);
        }
    }

    pub(crate) fn side(&self, kind: SlotKind) -> &Side<F> {
        match kind {
            SlotKind::Input => &self.input,
            SlotKind::Output => &self.output,
        }
    }

    pub(crate) fn side_mut(&mut self, kind: SlotKind) -> &mut Side<F> {
        match kind {
            SlotKind::Input => &mut self.input,
            SlotKind::Output => &mut self.output,
        }
    }

    /// Value buffer of a slot.
    pub fn value(&self, kind: SlotKind, index: usize) -> Result<&Buffer<F>> {
        let side = self.side(kind);
        side.values
            .get(index)
            .ok_or_else(|| Error::out_of_range("slot", index, side.values.len()))
    }

    /// Mutable value buffer of a slot.
    pub fn value_mut(&mut self, kind: SlotKind, index: usize) -> Result<&mut Buffer<F>> {
        let side = self.side_mut(kind);
        let len = side.values.len();
        side.values
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range("slot", index, len))
    }

    /// Sensitivity buffer of a slot for one direction.
    pub fn sensitivity(
        &self,
        kind: SlotKind,
        index: usize,
        mode: SensMode,
        dir: usize,
    ) -> Result<&Buffer<F>> {
        let side = self.side(kind);
        let dirs = match mode {
            SensMode::Forward => &side.fwd,
            SensMode::Adjoint => &side.adj,
        };
        let bufs = dirs
            .get(dir)
            .ok_or_else(|| Error::out_of_range("direction", dir, dirs.len()))?;
        bufs.get(index)
            .ok_or_else(|| Error::out_of_range("slot", index, bufs.len()))
    }

    /// Mutable sensitivity buffer of a slot for one direction.
    pub fn sensitivity_mut(
        &mut self,
        kind: SlotKind,
        index: usize,
        mode: SensMode,
        dir: usize,
    ) -> Result<&mut Buffer<F>> {
        let side = self.side_mut(kind);
        let dirs = match mode {
            SensMode::Forward => &mut side.fwd,
            SensMode::Adjoint => &mut side.adj,
        };
        let ndir = dirs.len();
        let bufs = dirs
            .get_mut(dir)
            .ok_or_else(|| Error::out_of_range("direction", dir, ndir))?;
        let len = bufs.len();
        bufs.get_mut(index)
            .ok_or_else(|| Error::out_of_range("slot", index, len))
    }

    /// Dependency words of a slot (sparsity propagation state).
    pub fn dep(&self, kind: SlotKind, index: usize) -> Result<&[u64]> {
        let side = self.side(kind);
        side.dep
            .get(index)
            .map(|d| d.as_slice())
            .ok_or_else(|| Error::out_of_range("slot", index, side.dep.len()))
    }

    /// Mutable dependency words of a slot.
    pub fn dep_mut(&mut self, kind: SlotKind, index: usize) -> Result<&mut [u64]> {
        let side = self.side_mut(kind);
        let len = side.dep.len();
        side.dep
            .get_mut(index)
            .map(|d| d.as_mut_slice())
            .ok_or_else(|| Error::out_of_range("slot", index, len))
    }

    /// Clear the dependency words of every slot on one side.
    pub fn clear_dep(&mut self, kind: SlotKind) {
        for words in &mut self.side_mut(kind).dep {
            words.fill(0);
        }
    }

    /// Split borrow for the propagation sweep: mutable dependency
    /// words of every input and every output slot simultaneously.
    pub(crate) fn dep_split(&mut self) -> (Vec<&mut [u64]>, Vec<&mut [u64]>) {
        let input = self.input.dep.iter_mut().map(|d| d.as_mut_slice()).collect();
        let output = self
            .output
            .dep
            .iter_mut()
            .map(|d| d.as_mut_slice())
            .collect();
        (input, output)
    }
}
