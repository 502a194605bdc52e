//! Dense 2-D value buffers with a fixed shape.
//!
//! Every I/O slot owns one value buffer plus one same-shaped buffer per
//! active derivative direction. Shapes are fixed at construction and
//! storage is reused across evaluations, so references handed out
//! between calls stay valid until the direction counts change.

use crate::error::{Error, Result};
use crate::float::Float;

/// Dense row-major 2-D buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer<F: Float> {
    nrow: usize,
    ncol: usize,
    data: Vec<F>,
}

impl<F: Float> Buffer<F> {
    /// Zero-filled buffer of the given shape.
    pub fn zeros(nrow: usize, ncol: usize) -> Self {
        Buffer {
            nrow,
            ncol,
            data: vec![F::zero(); nrow * ncol],
        }
    }

    /// Column vector built from a slice.
    pub fn column(values: &[F]) -> Self {
        Buffer {
            nrow: values.len(),
            ncol: 1,
            data: values.to_vec(),
        }
    }

    /// 1x1 buffer holding a single scalar.
    pub fn scalar(value: F) -> Self {
        Buffer {
            nrow: 1,
            ncol: 1,
            data: vec![value],
        }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// `(nrow, ncol)` pair.
    pub fn shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Single-column shape test; derivative blocks require this.
    pub fn is_column(&self) -> bool {
        self.ncol == 1
    }

    /// 1x1 shape test.
    pub fn is_scalar(&self) -> bool {
        self.nrow == 1 && self.ncol == 1
    }

    /// Entry at `(r, c)`.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> F {
        self.data[r * self.ncol + c]
    }

    /// Set entry at `(r, c)`.
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: F) {
        self.data[r * self.ncol + c] = value;
    }

    /// Flat entry view (row-major).
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    /// Flat mutable entry view (row-major).
    pub fn as_mut_slice(&mut self) -> &mut [F] {
        &mut self.data
    }

    /// Overwrite every entry with zero.
    pub fn fill_zero(&mut self) {
        self.data.fill(F::zero());
    }

    /// Copy all entries from a flat slice of matching length.
    pub fn assign(&mut self, values: &[F]) -> Result<()> {
        if values.len() != self.data.len() {
            return Err(Error::DimensionMismatch {
                expected: (self.nrow, self.ncol),
                got: (values.len(), 1),
            });
        }
        self.data.copy_from_slice(values);
        Ok(())
    }

    /// Copy entries from another buffer of identical shape.
    pub fn assign_from(&mut self, other: &Buffer<F>) -> Result<()> {
        if other.shape() != self.shape() {
            return Err(Error::DimensionMismatch {
                expected: self.shape(),
                got: other.shape(),
            });
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }
}
