//! Frequent Directions: a bounded, rank-`l` sketch of a growing row set.
//!
//! The sketch keeps a `2l × d` buffer. New rows go into free (all-zero)
//! slots; once no slot is free the buffer is compacted by an SVD-based
//! shrink that leaves at most `l - 1` non-zero rows. For any sequence of rows
//! `A` fed through the sketch the final buffer `B` satisfies
//!
//! ```text
//! 0 ≼ AᵗA − BᵗB   and   ‖AᵗA − BᵗB‖₂ ≤ ‖A‖_F² / l
//! ```
//!
//! # Usage
//!
//! ```rust
//! use attp::kernel::FrequentDirections;
//!
//! let mut fd = FrequentDirections::new(4, 3)?;
//! for i in 0..100 {
//!     let x = i as f64;
//!     fd.insert(&[x.sin(), x.cos(), 1.0])?;
//! }
//! assert!(fd.live_rows() <= fd.capacity());
//! # Ok::<(), attp::AttpError>(())
//! ```

use super::linalg::{self, Matrix, PowerIteration};
use super::slots::FreeSlots;
use crate::error::{AttpError, Result};
use tracing::trace;

/// Shrunk singular values at or below `σ₀ * ZERO_FLOOR` become exact zeros.
const ZERO_FLOOR: f64 = 1e-12;

/// Bounded Frequent Directions sketch over `d`-dimensional rows.
///
/// `Clone` produces a deep, independent copy; full checkpoints rely on this.
#[derive(Clone, Debug)]
pub struct FrequentDirections {
    l: usize,
    d: usize,
    /// Row-major: 2l rows × d columns.
    buffer: Vec<f64>,
    free: FreeSlots,
}

impl FrequentDirections {
    /// Create an empty sketch of rank `l` over dimension `d`.
    ///
    /// Both must be positive.
    pub fn new(l: usize, d: usize) -> Result<Self> {
        if l == 0 {
            return Err(AttpError::InvalidParameter(
                "sketch rank l must be positive".into(),
            ));
        }
        if d == 0 {
            return Err(AttpError::InvalidParameter(
                "row dimension d must be positive".into(),
            ));
        }
        Ok(Self {
            l,
            d,
            buffer: vec![0.0; 2 * l * d],
            free: FreeSlots::full(2 * l),
        })
    }

    // --- Accessors ---

    pub fn rank(&self) -> usize {
        self.l
    }

    pub fn dim(&self) -> usize {
        self.d
    }

    /// Buffer rows (`2l`).
    pub fn capacity(&self) -> usize {
        2 * self.l
    }

    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Number of non-zero rows.
    pub fn live_rows(&self) -> usize {
        self.rows().filter(|r| !linalg::is_zero(r)).count()
    }

    pub fn is_empty(&self) -> bool {
        linalg::is_zero(&self.buffer)
    }

    /// The raw `2l × d` buffer, zero rows included.
    pub fn buffer(&self) -> &[f64] {
        &self.buffer
    }

    /// Independent copy of the raw buffer.
    pub fn snapshot(&self) -> Vec<f64> {
        self.buffer.clone()
    }

    /// Live rows in buffer order as a `k × d` matrix.
    pub fn to_matrix(&self) -> Matrix {
        let mut data = Vec::with_capacity(self.buffer.len());
        let mut k = 0;
        for row in self.rows().filter(|r| !linalg::is_zero(r)) {
            data.extend_from_slice(row);
            k += 1;
        }
        Matrix::from_row_major(k, self.d, data)
    }

    /// `BᵗB` as a dense `d × d` row-major matrix.
    pub fn covariance(&self) -> Vec<f64> {
        linalg::gram(&self.buffer, self.capacity(), self.d)
    }

    /// `BᵗB` as a column-major packed upper triangle of `d(d+1)/2` entries.
    pub fn packed_covariance(&self) -> Vec<f64> {
        linalg::packed_upper_gram(&self.buffer, self.capacity(), self.d)
    }

    /// `‖B‖_F²`.
    pub fn frobenius_sq(&self) -> f64 {
        linalg::norm_sq(&self.buffer)
    }

    /// Leading eigenvalue of `BᵗB` via power iteration from `start`.
    pub fn leading_eigenvalue(&self, power: &PowerIteration, start: &[f64]) -> f64 {
        power.leading_eigenvalue(&self.buffer, self.capacity(), self.d, start)
    }

    /// `λ_max(BᵗB)` from a symmetric eigendecomposition of the `d × d`
    /// covariance.
    pub fn exact_leading_eigenvalue(&self) -> f64 {
        linalg::symmetric_spectral_norm(&self.covariance(), self.d)
    }

    /// Bytes held by the buffer.
    pub fn memory_usage(&self) -> usize {
        2 * self.l * self.d * std::mem::size_of::<f64>()
    }

    // --- Core methods ---

    /// Insert a row, shrinking first if the buffer has no free slot.
    pub fn insert(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.d {
            return Err(AttpError::DimensionMismatch {
                expected: self.d,
                got: row.len(),
            });
        }
        self.push_row(row);
        Ok(())
    }

    /// Insert a row already known to have dimension `d`.
    pub(crate) fn push_row(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.d);
        if self.free.is_empty() {
            self.shrink();
        }
        let slot = self
            .free
            .pop()
            .expect("shrink leaves at least l + 1 free slots");
        self.buffer[slot * self.d..(slot + 1) * self.d].copy_from_slice(row);
    }

    /// SVD compaction down to at most `l - 1` non-zero rows.
    ///
    /// With `B = UΣVᵗ` and `ε = σ²_{l-1}`, the buffer becomes
    /// `diag(√(σ²ⱼ − ε))ⱼ<l-1 · Vᵗ`; every other row is zeroed and returned to
    /// the free-slot stack.
    pub fn shrink(&mut self) {
        let rows = self.capacity();
        let before = self.live_rows();
        let (sigma, vt) = linalg::thin_svd(&self.buffer, rows, self.d);

        let epsilon = sigma.get(self.l - 1).map(|s| s * s).unwrap_or(0.0);
        let floor = sigma.first().copied().unwrap_or(0.0) * ZERO_FLOOR;

        self.buffer.fill(0.0);
        let keep = (self.l - 1).min(sigma.len());
        for j in 0..keep {
            // Near-ties can round σ² − ε below zero; clamp instead of NaN.
            let shrunk = (sigma[j] * sigma[j] - epsilon).max(0.0).sqrt();
            if shrunk <= floor {
                continue;
            }
            let dst = &mut self.buffer[j * self.d..(j + 1) * self.d];
            for (b, &v) in dst.iter_mut().zip(&vt[j * self.d..(j + 1) * self.d]) {
                *b = shrunk * v;
            }
        }
        self.rebuild_free_slots();

        trace!(
            l = self.l,
            d = self.d,
            before,
            after = self.live_rows(),
            epsilon,
            "shrink"
        );
    }

    /// Shrink only if more than `l` rows are live.
    pub fn compact(&mut self) {
        if self.live_rows() > self.l {
            self.shrink();
        }
    }

    /// Remove and return the lowest-indexed non-zero row.
    ///
    /// An empty buffer yields a zero vector.
    pub fn evict_oldest_nonzero(&mut self) -> Vec<f64> {
        let d = self.d;
        let found = self
            .buffer
            .chunks_exact(d)
            .position(|r| !linalg::is_zero(r));
        match found {
            Some(i) => {
                let row = &mut self.buffer[i * d..(i + 1) * d];
                let out = row.to_vec();
                row.fill(0.0);
                self.free.push(i);
                out
            }
            None => vec![0.0; d],
        }
    }

    /// Reset to the freshly constructed state.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.free = FreeSlots::full(self.capacity());
    }

    // --- Private helpers ---

    fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.buffer.chunks_exact(self.d)
    }

    /// Free every all-zero row, scanning from the last row backwards.
    fn rebuild_free_slots(&mut self) {
        self.free.clear();
        for k in (0..self.capacity()).rev() {
            if linalg::is_zero(&self.buffer[k * self.d..(k + 1) * self.d]) {
                self.free.push(k);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::linalg::{gram, symmetric_spectral_norm};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn random_rows(n: usize, d: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..d).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect()
    }

    /// Exact AᵗA minus the sketch's BᵗB.
    fn residual(rows: &[Vec<f64>], fd: &FrequentDirections) -> Vec<f64> {
        let d = fd.dim();
        let a = Matrix::from_rows(d, rows);
        let ata = a.gram();
        let btb = fd.covariance();
        ata.iter().zip(btb.iter()).map(|(x, y)| x - y).collect()
    }

    #[test]
    fn test_rejects_zero_parameters() {
        assert!(matches!(
            FrequentDirections::new(0, 3),
            Err(AttpError::InvalidParameter(_))
        ));
        assert!(matches!(
            FrequentDirections::new(3, 0),
            Err(AttpError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut fd = FrequentDirections::new(2, 3).unwrap();
        let err = fd.insert(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            AttpError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn test_insert_fills_lowest_slot_first() {
        let mut fd = FrequentDirections::new(2, 2).unwrap();
        fd.insert(&[1.0, 0.0]).unwrap();
        fd.insert(&[0.0, 2.0]).unwrap();
        assert_eq!(&fd.buffer()[..4], &[1.0, 0.0, 0.0, 2.0]);
        assert_eq!(fd.free_slots(), 2);
        assert_eq!(fd.live_rows(), 2);
    }

    #[test]
    fn test_evicted_slot_is_reused_first() {
        let mut fd = FrequentDirections::new(2, 2).unwrap();
        fd.insert(&[1.0, 0.0]).unwrap();
        fd.insert(&[0.0, 2.0]).unwrap();

        let evicted = fd.evict_oldest_nonzero();
        assert_eq!(evicted, vec![1.0, 0.0]);
        assert_eq!(&fd.buffer()[..2], &[0.0, 0.0]);

        fd.insert(&[5.0, 5.0]).unwrap();
        assert_eq!(&fd.buffer()[..2], &[5.0, 5.0]);
    }

    #[test]
    fn test_evict_from_empty_returns_zero_row() {
        let mut fd = FrequentDirections::new(3, 4).unwrap();
        assert_eq!(fd.evict_oldest_nonzero(), vec![0.0; 4]);
        assert_eq!(fd.free_slots(), 6);
        assert!(fd.is_empty());
    }

    #[test]
    fn test_rank_bound_after_shrink() {
        let l = 4;
        let mut fd = FrequentDirections::new(l, 10).unwrap();
        for row in random_rows(2 * l, 10, 1) {
            fd.insert(&row).unwrap();
        }
        assert_eq!(fd.free_slots(), 0);
        fd.shrink();
        assert!(fd.live_rows() <= l, "live rows {} > l", fd.live_rows());
        assert_eq!(fd.free_slots(), fd.capacity() - fd.live_rows());

        // Every automatic shrink keeps the bound too.
        for (i, row) in random_rows(200, 10, 2).iter().enumerate() {
            let shrinks = fd.free_slots() == 0;
            fd.insert(row).unwrap();
            if shrinks {
                assert!(fd.live_rows() <= l, "step {}: {}", i, fd.live_rows());
            }
        }
    }

    #[test]
    fn test_error_bound_holds() {
        let (l, d, n) = (5, 12, 400);
        let rows = random_rows(n, d, 42);
        let mut fd = FrequentDirections::new(l, d).unwrap();
        for row in &rows {
            fd.insert(row).unwrap();
        }

        let a = Matrix::from_rows(d, &rows);
        let bound = a.frobenius_sq() / l as f64;
        let err = symmetric_spectral_norm(&residual(&rows, &fd), d);
        assert!(err <= bound + 1e-9, "err {} > bound {}", err, bound);
    }

    #[test]
    fn test_sketch_never_overestimates() {
        let (l, d) = (3, 6);
        let rows = random_rows(150, d, 7);
        let mut fd = FrequentDirections::new(l, d).unwrap();
        for row in &rows {
            fd.insert(row).unwrap();
        }
        // AᵗA − BᵗB is positive semidefinite.
        let diff = nalgebra::DMatrix::from_row_slice(d, d, &residual(&rows, &fd));
        let min_eig = diff
            .symmetric_eigen()
            .eigenvalues
            .iter()
            .fold(f64::INFINITY, |acc, &e| acc.min(e));
        assert!(min_eig > -1e-9, "min eigenvalue {}", min_eig);
    }

    #[test]
    fn test_low_rank_stream_is_captured_exactly() {
        // Rows from a 2-dimensional subspace with l = 4 leave no residual.
        let d = 6;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut fd = FrequentDirections::new(4, d).unwrap();
        let mut rows = Vec::new();
        for _ in 0..100 {
            let (a, b): (f64, f64) = (rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            let row = vec![a, b, a + b, 0.0, a - b, 0.0];
            fd.insert(&row).unwrap();
            rows.push(row);
        }
        let err = symmetric_spectral_norm(&residual(&rows, &fd), d);
        assert!(err < 1e-8, "err {}", err);
    }

    #[test]
    fn test_shrink_with_dimension_below_rank() {
        // d < l: only d singular values exist, ε falls back to zero.
        let mut fd = FrequentDirections::new(4, 2).unwrap();
        for row in random_rows(30, 2, 5) {
            fd.insert(&row).unwrap();
        }
        assert!(fd.live_rows() <= fd.capacity());
        assert!(fd.frobenius_sq().is_finite());
        fd.shrink();
        assert!(fd.live_rows() <= 2);
    }

    #[test]
    fn test_rank_one_shrink_clears_buffer() {
        let mut fd = FrequentDirections::new(1, 3).unwrap();
        fd.insert(&[1.0, 0.0, 0.0]).unwrap();
        fd.insert(&[0.0, 1.0, 0.0]).unwrap();
        fd.insert(&[0.0, 0.0, 1.0]).unwrap();
        // The third insert shrank everything away first.
        assert_eq!(fd.live_rows(), 1);
        assert_eq!(&fd.buffer()[..3], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_shrink_with_tied_singular_values() {
        // Every singular value equals √8, so σⱼ² − ε is zero up to rounding.
        let (l, d) = (3, 3);
        let mut fd = FrequentDirections::new(l, d).unwrap();
        for _ in 0..2 {
            for k in 0..d {
                let mut row = vec![0.0; d];
                row[k] = 2.0;
                fd.insert(&row).unwrap();
            }
        }
        assert_eq!(fd.free_slots(), 0);

        fd.shrink();
        assert!(fd.buffer().iter().all(|x| x.is_finite()));
        assert!(fd.frobenius_sq() < 1e-6, "{}", fd.frobenius_sq());
        assert!(fd.live_rows() <= l - 1);
        assert_eq!(fd.free_slots() + fd.live_rows(), fd.capacity());

        fd.insert(&[0.0, 0.0, 5.0]).unwrap();
        assert!(fd.buffer().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_compact_only_when_over_rank() {
        let mut fd = FrequentDirections::new(2, 2).unwrap();
        fd.insert(&[1.0, 0.0]).unwrap();
        fd.insert(&[0.0, 1.0]).unwrap();
        let before = fd.snapshot();
        fd.compact();
        assert_eq!(fd.snapshot(), before);

        fd.insert(&[1.0, 1.0]).unwrap();
        fd.compact();
        assert!(fd.live_rows() <= 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut fd = FrequentDirections::new(2, 2).unwrap();
        fd.insert(&[1.0, 2.0]).unwrap();
        let copy = fd.clone();
        fd.insert(&[3.0, 4.0]).unwrap();
        fd.evict_oldest_nonzero();
        assert_eq!(copy.live_rows(), 1);
        assert_eq!(&copy.buffer()[..2], &[1.0, 2.0]);
    }

    #[test]
    fn test_packed_covariance_matches_dense() {
        let mut fd = FrequentDirections::new(3, 4).unwrap();
        for row in random_rows(10, 4, 9) {
            fd.insert(&row).unwrap();
        }
        let dense = fd.covariance();
        let unpacked = linalg::unpack_upper(&fd.packed_covariance(), 4);
        for (a, b) in dense.iter().zip(unpacked.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(dense, gram(fd.buffer(), fd.capacity(), 4));
    }

    #[test]
    fn test_to_matrix_skips_zero_rows() {
        let mut fd = FrequentDirections::new(2, 2).unwrap();
        fd.insert(&[1.0, 0.0]).unwrap();
        fd.insert(&[0.0, 0.0]).unwrap();
        fd.insert(&[0.0, 3.0]).unwrap();
        let m = fd.to_matrix();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.row(1), &[0.0, 3.0]);
        assert_eq!(fd.memory_usage(), 2 * 2 * 2 * 8);
    }

    #[test]
    fn test_clear_resets() {
        let mut fd = FrequentDirections::new(2, 2).unwrap();
        for row in random_rows(9, 2, 1) {
            fd.insert(&row).unwrap();
        }
        fd.clear();
        assert!(fd.is_empty());
        assert_eq!(fd.free_slots(), 4);
    }
}
