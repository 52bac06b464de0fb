//! Dense linear algebra helpers for row-major sketch buffers.
//!
//! Everything here works on flat `&[f64]` storage where row `i` of an
//! `rows × cols` matrix lives at `data[i * cols..(i + 1) * cols]`. Only the
//! decompositions (SVD, symmetric eigen) go through `nalgebra`; the hot path
//! of the checkpoint chain (the leading eigenvalue of `BᵗB`) is a plain power
//! iteration that never forms the `d × d` Gram matrix.

use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A dense row-major matrix, as returned by time-travel queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// Flat row-major: rows × cols.
    data: Vec<f64>,
}

impl Matrix {
    /// A `0 × cols` matrix.
    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    /// Wrap flat row-major data.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "Expected {}x{} = {} values, got {}",
            rows,
            cols,
            rows * cols,
            data.len()
        );
        Self { rows, cols, data }
    }

    /// Build from a list of equally sized rows.
    pub fn from_rows(cols: usize, rows: &[Vec<f64>]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in rows {
            assert_eq!(r.len(), cols, "Row length mismatch");
            data.extend_from_slice(r);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.cols.max(1))
    }

    /// Second moment `MᵗM` as a dense `cols × cols` row-major matrix.
    pub fn gram(&self) -> Vec<f64> {
        gram(&self.data, self.rows, self.cols)
    }

    /// Squared Frobenius norm.
    pub fn frobenius_sq(&self) -> f64 {
        norm_sq(&self.data)
    }
}

/// Dot product.
#[cfg(feature = "simd")]
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    use simsimd::SpatialSimilarity;
    f64::dot(a, b).unwrap_or_else(|| dot_raw(a, b))
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    dot_raw(a, b)
}

#[inline]
fn dot_raw(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in dot product");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm_sq(v: &[f64]) -> f64 {
    dot(v, v)
}

#[inline]
pub fn norm(v: &[f64]) -> f64 {
    norm_sq(v).sqrt()
}

/// `true` if every component is exactly zero.
#[inline]
pub fn is_zero(v: &[f64]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

/// `BᵗB` for a row-major `rows × cols` buffer, returned as `cols × cols` row-major.
pub fn gram(b: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; cols * cols];
    for r in 0..rows {
        let row = &b[r * cols..(r + 1) * cols];
        if is_zero(row) {
            continue;
        }
        for (i, &ri) in row.iter().enumerate() {
            if ri == 0.0 {
                continue;
            }
            let base = i * cols;
            for (o, &rj) in out[base..base + cols].iter_mut().zip(row.iter()) {
                *o += ri * rj;
            }
        }
    }
    out
}

/// `BᵗB` in column-major packed upper-triangular form.
///
/// Element `(i, j)` with `i <= j` lives at `i + j * (j + 1) / 2`; the result
/// has `cols * (cols + 1) / 2` entries.
pub fn packed_upper_gram(b: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; cols * (cols + 1) / 2];
    for r in 0..rows {
        let row = &b[r * cols..(r + 1) * cols];
        if is_zero(row) {
            continue;
        }
        let mut k = 0;
        for j in 0..cols {
            for i in 0..=j {
                out[k] += row[i] * row[j];
                k += 1;
            }
        }
    }
    out
}

/// Expand a packed upper triangle into a full symmetric `n × n` row-major matrix.
pub fn unpack_upper(packed: &[f64], n: usize) -> Vec<f64> {
    assert_eq!(packed.len(), n * (n + 1) / 2, "Packed length mismatch");
    let mut out = vec![0.0; n * n];
    let mut k = 0;
    for j in 0..n {
        for i in 0..=j {
            out[i * n + j] = packed[k];
            out[j * n + i] = packed[k];
            k += 1;
        }
    }
    out
}

/// Deterministic unit-norm start vector for power iteration.
pub fn start_vector(dim: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut v: Vec<f64> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let n = norm(&v);
    if n < 1e-12 {
        v.iter_mut().for_each(|x| *x = 0.0);
        if let Some(first) = v.first_mut() {
            *first = 1.0;
        }
    } else {
        v.iter_mut().for_each(|x| *x /= n);
    }
    v
}

/// Power iteration settings for the leading eigenvalue of `BᵗB`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerIteration {
    pub max_iters: usize,
    /// Relative change in the Rayleigh quotient below which iteration stops.
    pub tolerance: f64,
}

impl Default for PowerIteration {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tolerance: 1e-10,
        }
    }
}

impl PowerIteration {
    /// Leading eigenvalue of `BᵗB` (= largest squared singular value of `B`).
    ///
    /// Iterates `v ← Bᵗ(Bv) / ‖Bᵗ(Bv)‖` and returns `‖Bv‖²` for the final unit
    /// `v`, which never overshoots the true eigenvalue. If `start` happens to be
    /// orthogonal to the row space, iteration restarts from the heaviest row.
    pub fn leading_eigenvalue(&self, b: &[f64], rows: usize, cols: usize, start: &[f64]) -> f64 {
        debug_assert_eq!(start.len(), cols);
        let mut v = start.to_vec();
        let mut lambda = 0.0_f64;
        let mut restarted = false;
        let mut bv = vec![0.0; rows];
        let mut w = vec![0.0; cols];

        for _ in 0..self.max_iters.max(1) {
            for (r, out) in bv.iter_mut().enumerate() {
                *out = dot(&b[r * cols..(r + 1) * cols], &v);
            }
            let current = norm_sq(&bv);

            w.iter_mut().for_each(|x| *x = 0.0);
            for (r, &coef) in bv.iter().enumerate() {
                if coef == 0.0 {
                    continue;
                }
                for (wi, &bi) in w.iter_mut().zip(&b[r * cols..(r + 1) * cols]) {
                    *wi += coef * bi;
                }
            }
            let w_norm = norm(&w);

            if w_norm == 0.0 {
                if restarted {
                    return lambda.max(current);
                }
                match heaviest_row(b, rows, cols) {
                    Some(row) => {
                        let n = norm(row);
                        v = row.iter().map(|x| x / n).collect();
                        restarted = true;
                        continue;
                    }
                    None => return 0.0,
                }
            }

            let converged = (current - lambda).abs() <= self.tolerance * current.max(f64::MIN_POSITIVE);
            lambda = lambda.max(current);
            if converged {
                break;
            }
            for (vi, wi) in v.iter_mut().zip(w.iter()) {
                *vi = wi / w_norm;
            }
        }
        lambda
    }
}

fn heaviest_row(b: &[f64], rows: usize, cols: usize) -> Option<&[f64]> {
    (0..rows)
        .map(|r| &b[r * cols..(r + 1) * cols])
        .map(|row| (norm_sq(row), row))
        .filter(|(e, _)| *e > 0.0)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, row)| row)
}

/// Thin SVD of a row-major `rows × cols` matrix.
///
/// Returns singular values sorted descending and the matching right singular
/// vectors as rows of a flat `n × cols` matrix, `n = min(rows, cols)`.
pub fn thin_svd(b: &[f64], rows: usize, cols: usize) -> (Vec<f64>, Vec<f64>) {
    let m = DMatrix::from_row_slice(rows, cols, b);
    let svd = m.svd(false, true);
    let n = svd.singular_values.len();
    let v_t = match svd.v_t {
        Some(v_t) => v_t,
        None => return (vec![0.0; n], vec![0.0; n * cols]),
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| svd.singular_values[j].total_cmp(&svd.singular_values[i]));

    let sigma: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();
    let mut vt = Vec::with_capacity(n * cols);
    for &i in &order {
        vt.extend(v_t.row(i).iter().copied());
    }
    (sigma, vt)
}

/// Spectral norm of a symmetric `n × n` row-major matrix (largest |eigenvalue|).
pub fn symmetric_spectral_norm(m: &[f64], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let mat = DMatrix::from_row_slice(n, n, m);
    mat.symmetric_eigen()
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, &e| acc.max(e.abs()))
}
