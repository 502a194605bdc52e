//! Sparse direct solver backend contract.
//!
//! External factor/solve engines (MUMPS-style) plug in through
//! [`SparseSolver`]: the structure is handed over once in compressed
//! column form, numeric values are refactorized as often as needed, and
//! solves happen in place. The core treats a backend as an opaque
//! numeric oracle; a backend may decline transposed or multi-right-hand
//! -side solves with `UnsupportedOperation`.
//!
//! [`DenseLu`] is the bundled reference backend: it scatters the
//! compressed structure into a dense matrix and factorizes with
//! partial-pivoting LU. Good enough for implicit-function derivative
//! tests; real workloads bring their own backend.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::repr::ReprKind;

/// Narrow factor/solve contract for sparse direct solvers.
pub trait SparseSolver<F: Float> {
    /// Hand over the nonzero structure: `row` holds row indices column
    /// by column, `colind` the column pointers (`len == ncol + 1`).
    /// The matrix must be square.
    fn init_structure(&mut self, row: &[usize], colind: &[usize]) -> Result<()>;

    /// Factorize with the given nonzero values (same order as the
    /// structure). Fails on singular matrices.
    fn factorize(&mut self, values: &[F]) -> Result<()>;

    /// Solve in place for `nrhs` right-hand sides stored contiguously
    /// (column-major) in `rhs`, optionally with the transposed matrix.
    fn solve(&mut self, rhs: &mut [F], nrhs: usize, transpose: bool) -> Result<()>;
}

/// Dense partial-pivoting LU reference backend.
pub struct DenseLu<F: Float> {
    n: usize,
    row: Vec<usize>,
    colind: Vec<usize>,
    /// Combined factors: L strictly below the diagonal (unit diagonal
    /// implicit), U on and above. Row-major, valid after `factorize`.
    lu: Vec<F>,
    /// `perm[i]` is the original row index of factored row `i`.
    perm: Vec<usize>,
    factored: bool,
}

impl<F: Float> Default for DenseLu<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> DenseLu<F> {
    pub fn new() -> Self {
        DenseLu {
            n: 0,
            row: Vec::new(),
            colind: Vec::new(),
            lu: Vec::new(),
            perm: Vec::new(),
            factored: false,
        }
    }

    fn singular(col: usize) -> Error {
        Error::Evaluation {
            kind: ReprKind::Numeric,
            slot: col,
            message: "singular matrix: zero pivot".to_string(),
        }
    }
}

impl<F: Float> SparseSolver<F> for DenseLu<F> {
    fn init_structure(&mut self, row: &[usize], colind: &[usize]) -> Result<()> {
        if colind.is_empty() {
            return Err(Error::ShapeError("empty column pointer array".into()));
        }
        let n = colind.len() - 1;
        if colind[n] != row.len() {
            return Err(Error::DimensionMismatch {
                expected: (colind[n], 1),
                got: (row.len(), 1),
            });
        }
        if let Some(&r) = row.iter().max() {
            if r >= n {
                return Err(Error::ShapeError(format!(
                    "row index {r} outside square structure of order {n}"
                )));
            }
        }
        self.n = n;
        self.row = row.to_vec();
        self.colind = colind.to_vec();
        self.factored = false;
        Ok(())
    }

    fn factorize(&mut self, values: &[F]) -> Result<()> {
        let n = self.n;
        if values.len() != self.row.len() {
            return Err(Error::DimensionMismatch {
                expected: (self.row.len(), 1),
                got: (values.len(), 1),
            });
        }

        // Scatter the compressed columns into a dense row-major matrix.
        let mut lu = vec![F::zero(); n * n];
        for c in 0..n {
            for k in self.colind[c]..self.colind[c + 1] {
                lu[self.row[k] * n + c] = lu[self.row[k] * n + c] + values[k];
            }
        }

        let mut perm: Vec<usize> = (0..n).collect();
        for col in 0..n {
            // Partial pivoting.
            let mut max_val = lu[col * n + col].abs();
            let mut max_row = col;
            for r in (col + 1)..n {
                let v = lu[r * n + col].abs();
                if v > max_val {
                    max_val = v;
                    max_row = r;
                }
            }
            if max_val < F::epsilon() {
                return Err(Self::singular(col));
            }
            if max_row != col {
                for j in 0..n {
                    lu.swap(col * n + j, max_row * n + j);
                }
                perm.swap(col, max_row);
            }

            let pivot = lu[col * n + col];
            for r in (col + 1)..n {
                let factor = lu[r * n + col] / pivot;
                lu[r * n + col] = factor;
                for j in (col + 1)..n {
                    let u = lu[col * n + j];
                    lu[r * n + j] = lu[r * n + j] - factor * u;
                }
            }
        }

        self.lu = lu;
        self.perm = perm;
        self.factored = true;
        Ok(())
    }

    fn solve(&mut self, rhs: &mut [F], nrhs: usize, transpose: bool) -> Result<()> {
        if !self.factored {
            return Err(Error::NotInitialized);
        }
        let n = self.n;
        if rhs.len() != n * nrhs {
            return Err(Error::DimensionMismatch {
                expected: (n, nrhs),
                got: (rhs.len(), 1),
            });
        }

        let lu = &self.lu;
        for b in rhs.chunks_mut(n) {
            if transpose {
                // A^T = U^T L^T P: forward-substitute U^T, then back-
                // substitute L^T (unit diagonal), then undo the row
                // permutation.
                let mut y = vec![F::zero(); n];
                for i in 0..n {
                    let mut s = b[i];
                    for j in 0..i {
                        s = s - lu[j * n + i] * y[j];
                    }
                    y[i] = s / lu[i * n + i];
                }
                for i in (0..n).rev() {
                    let mut s = y[i];
                    for j in (i + 1)..n {
                        s = s - lu[j * n + i] * y[j];
                    }
                    y[i] = s;
                }
                for i in 0..n {
                    b[self.perm[i]] = y[i];
                }
            } else {
                // PA = LU: permute, forward-substitute L (unit
                // diagonal), back-substitute U.
                let mut y: Vec<F> = (0..n).map(|i| b[self.perm[i]]).collect();
                for i in 0..n {
                    let mut s = y[i];
                    for j in 0..i {
                        s = s - lu[i * n + j] * y[j];
                    }
                    y[i] = s;
                }
                for i in (0..n).rev() {
                    let mut s = y[i];
                    for j in (i + 1)..n {
                        s = s - lu[i * n + j] * y[j];
                    }
                    y[i] = s / lu[i * n + i];
                }
                b.copy_from_slice(&y);
            }
        }
        Ok(())
    }
}
