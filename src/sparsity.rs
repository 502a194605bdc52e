//! Immutable compressed sparsity patterns.
//!
//! A [`Sparsity`] describes which entries of a 2-D block are
//! structurally nonzero, independent of numeric values. Patterns are
//! built once, shared by reference (`Arc`) across every consumer, and
//! never mutated afterwards, so concurrent reads are safe.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Compressed-column sparsity pattern.
///
/// `colind` has length `ncol + 1`; the row indices of column `c` live
/// in `row[colind[c]..colind[c + 1]]`, sorted and unique.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sparsity {
    nrow: usize,
    ncol: usize,
    colind: Vec<usize>,
    row: Vec<usize>,
}

impl Sparsity {
    /// Fully populated pattern: every entry structurally nonzero.
    pub fn dense(nrow: usize, ncol: usize) -> Self {
        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::with_capacity(nrow * ncol);
        colind.push(0);
        for _ in 0..ncol {
            row.extend(0..nrow);
            colind.push(row.len());
        }
        Sparsity {
            nrow,
            ncol,
            colind,
            row,
        }
    }

    /// Pattern with no structural nonzeros.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Sparsity {
            nrow,
            ncol,
            colind: vec![0; ncol + 1],
            row: Vec::new(),
        }
    }

    /// Build a pattern from `(row, col)` pairs. Duplicates collapse.
    pub fn from_pairs(nrow: usize, ncol: usize, pairs: &[(usize, usize)]) -> Self {
        let mut sorted: Vec<(usize, usize)> = pairs
            .iter()
            .map(|&(r, c)| {
                debug_assert!(r < nrow && c < ncol);
                (c, r)
            })
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::with_capacity(sorted.len());
        colind.push(0);
        let mut it = sorted.iter().peekable();
        for c in 0..ncol {
            while let Some(&&(col, r)) = it.peek() {
                if col != c {
                    break;
                }
                row.push(r);
                it.next();
            }
            colind.push(row.len());
        }
        Sparsity {
            nrow,
            ncol,
            colind,
            row,
        }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Number of structural nonzeros.
    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    /// Whether every entry is structurally nonzero.
    pub fn is_dense(&self) -> bool {
        self.nnz() == self.nrow * self.ncol
    }

    /// Single-column shape test.
    pub fn is_column(&self) -> bool {
        self.ncol == 1
    }

    /// 1x1 shape test.
    pub fn is_scalar(&self) -> bool {
        self.nrow == 1 && self.ncol == 1
    }

    /// Column pointer array, length `ncol + 1`.
    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    /// Row indices, column by column.
    pub fn row(&self) -> &[usize] {
        &self.row
    }

    /// Row indices of one column.
    pub fn column(&self, c: usize) -> &[usize] {
        &self.row[self.colind[c]..self.colind[c + 1]]
    }

    /// Structural membership test for entry `(r, c)`.
    pub fn contains(&self, r: usize, c: usize) -> bool {
        if r >= self.nrow || c >= self.ncol {
            return false;
        }
        self.column(c).binary_search(&r).is_ok()
    }

    /// All structural nonzeros as `(row, col)` pairs in column order.
    pub fn to_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::with_capacity(self.nnz());
        for c in 0..self.ncol {
            for &r in self.column(c) {
                pairs.push((r, c));
            }
        }
        pairs
    }

    /// Transposed pattern.
    pub fn transpose(&self) -> Sparsity {
        let flipped: Vec<(usize, usize)> = self.to_pairs().iter().map(|&(r, c)| (c, r)).collect();
        Sparsity::from_pairs(self.ncol, self.nrow, &flipped)
    }

    /// Union of two patterns of identical shape.
    pub fn unite(&self, other: &Sparsity) -> Sparsity {
        debug_assert_eq!((self.nrow, self.ncol), (other.nrow, other.ncol));
        let mut pairs = self.to_pairs();
        pairs.extend(other.to_pairs());
        Sparsity::from_pairs(self.nrow, self.ncol, &pairs)
    }

    /// Wrap in an [`Arc`] for sharing across consumers.
    pub fn shared(self) -> Arc<Sparsity> {
        Arc::new(self)
    }
}
