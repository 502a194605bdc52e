//! Boolean sparsity propagation and Jacobian-sparsity construction.
//!
//! A propagation sweep is the bit-valued analogue of an evaluation
//! pass: every buffer entry carries one 64-bit dependency word instead
//! of a number, so a single sweep traces up to 64 seeded structural
//! nonzeros at once. The Jacobian-sparsity builder seeds one side in
//! 64-entry batches, unions the resulting bits into a pattern, and
//! memoizes it per `(input, output, compact)` key. Over-approximation
//! (a reported dependency that never affects the numeric value) is the
//! accepted conservative bias; missing a true dependency is a bug.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::float::Float;
use crate::function::Function;
use crate::slots::SlotKind;
use crate::sparsity::Sparsity;

impl<F: Float> Function<F> {
    /// Whether the backing representation supports bit-level
    /// propagation in the requested direction. When `false`, callers
    /// fall back to dense sparsity as the conservative default.
    pub fn sp_can_evaluate(&self, forward: bool) -> bool {
        self.repr.can_propagate(forward)
    }

    /// Reset all dependency words to zero ahead of a propagation pass.
    pub fn sp_init(&mut self, _forward: bool) {
        self.store.clear_dep(SlotKind::Input);
        self.store.clear_dep(SlotKind::Output);
    }

    /// Set seed bits in one entry's dependency word.
    pub fn sp_seed(&mut self, kind: SlotKind, slot: usize, entry: usize, bits: u64) -> Result<()> {
        let dep = self.store.dep_mut(kind, slot)?;
        let len = dep.len();
        let word = dep
            .get_mut(entry)
            .ok_or_else(|| Error::out_of_range("entry", entry, len))?;
        *word |= bits;
        Ok(())
    }

    /// Dependency words of one slot after a pass.
    pub fn sp_read(&self, kind: SlotKind, slot: usize) -> Result<&[u64]> {
        self.store.dep(kind, slot)
    }

    /// Run one propagation sweep: forward traces seeded input bits to
    /// the outputs, backward scatters seeded output bits onto the
    /// inputs.
    pub fn sp_evaluate(&mut self, forward: bool) -> Result<()> {
        self.assert_ready()?;
        if !self.repr.can_propagate(forward) {
            return Err(Error::UnsupportedOperation(
                "bit-level sparsity propagation",
            ));
        }
        let repr = Arc::clone(&self.repr);
        let (mut input_dep, mut output_dep) = self.store.dep_split();
        repr.propagate(&mut input_dep, &mut output_dep, forward)
    }

    /// Get, building and caching if necessary, the sparsity of the
    /// Jacobian block of output `oind` with respect to input `iind`.
    ///
    /// With dense slot buffers the compact and non-compact patterns
    /// coincide; the flag is kept in the cache key for callers that
    /// pre-seed one flavor via
    /// [`set_jac_sparsity`](Function::set_jac_sparsity).
    pub fn jac_sparsity(
        &mut self,
        iind: usize,
        oind: usize,
        compact: bool,
    ) -> Result<Arc<Sparsity>> {
        self.assert_ready()?;
        let n = self.input(iind)?.len();
        let m = self.output(oind)?.len();

        if let Some(sp) = self
            .jac_cache
            .lock()
            .expect("sparsity cache lock poisoned")
            .get(&(iind, oind, compact))
        {
            return Ok(Arc::clone(sp));
        }

        let can_fwd = self.sp_can_evaluate(true);
        let can_adj = self.sp_can_evaluate(false);
        let pattern = if can_fwd && (n <= m || !can_adj) {
            self.propagate_pattern(iind, oind, true, n, m)?
        } else if can_adj {
            self.propagate_pattern(iind, oind, false, n, m)?
        } else {
            // Conservative fallback: everything depends on everything.
            Sparsity::dense(m, n)
        };

        let shared = pattern.shared();
        self.jac_cache
            .lock()
            .expect("sparsity cache lock poisoned")
            .insert((iind, oind, compact), Arc::clone(&shared));
        Ok(shared)
    }

    /// Pre-seed the sparsity cache with an externally known pattern.
    pub fn set_jac_sparsity(
        &mut self,
        iind: usize,
        oind: usize,
        compact: bool,
        pattern: Arc<Sparsity>,
    ) -> Result<()> {
        let n = self.input(iind)?.len();
        let m = self.output(oind)?.len();
        if (pattern.nrow(), pattern.ncol()) != (m, n) {
            return Err(Error::DimensionMismatch {
                expected: (m, n),
                got: (pattern.nrow(), pattern.ncol()),
            });
        }
        self.jac_cache
            .lock()
            .expect("sparsity cache lock poisoned")
            .insert((iind, oind, compact), pattern);
        Ok(())
    }

    /// Seeded 64-way sweeps over one side, unioned into a pattern.
    fn propagate_pattern(
        &mut self,
        iind: usize,
        oind: usize,
        forward: bool,
        n: usize,
        m: usize,
    ) -> Result<Sparsity> {
        let (seed_kind, seed_slot, seed_len, read_kind, read_slot) = if forward {
            (SlotKind::Input, iind, n, SlotKind::Output, oind)
        } else {
            (SlotKind::Output, oind, m, SlotKind::Input, iind)
        };

        let mut pairs: Vec<(usize, usize)> = Vec::new();
        let mut base = 0;
        while base < seed_len {
            let batch = (seed_len - base).min(64);
            self.sp_init(forward);
            for bit in 0..batch {
                self.sp_seed(seed_kind, seed_slot, base + bit, 1u64 << bit)?;
            }
            self.sp_evaluate(forward)?;

            let words = self.sp_read(read_kind, read_slot)?;
            for (entry, &word) in words.iter().enumerate() {
                let mut w = word;
                while w != 0 {
                    let bit = w.trailing_zeros() as usize;
                    let seeded = base + bit;
                    // Jacobian entry (row = output entry, col = input entry).
                    if forward {
                        pairs.push((entry, seeded));
                    } else {
                        pairs.push((seeded, entry));
                    }
                    w &= w - 1;
                }
            }
            base += batch;
        }
        Ok(Sparsity::from_pairs(m, n, &pairs))
    }
}
