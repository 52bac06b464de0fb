//! Exact second moment of a stream prefix, for validating sketch answers.

use crate::error::{AttpError, Result};
use crate::kernel::linalg::{self, Matrix};
use crate::memory::Timestamp;
use std::borrow::Cow;

/// Running `AᵗA` and `‖A‖_F²` over every row seen so far.
#[derive(Clone, Debug)]
pub struct ExactCovariance {
    d: usize,
    /// Row-major d × d.
    ata: Vec<f64>,
    frobenius_sq: f64,
    rows: u64,
}

impl ExactCovariance {
    pub fn new(d: usize) -> Self {
        Self {
            d,
            ata: vec![0.0; d * d],
            frobenius_sq: 0.0,
            rows: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.d
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// `AᵗA`, row-major `d × d`.
    pub fn covariance(&self) -> &[f64] {
        &self.ata
    }

    pub fn frobenius_sq(&self) -> f64 {
        self.frobenius_sq
    }

    /// Add one row's outer product.
    pub fn update(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.d {
            return Err(AttpError::DimensionMismatch {
                expected: self.d,
                got: row.len(),
            });
        }
        self.add(row);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.ata.fill(0.0);
        self.frobenius_sq = 0.0;
        self.rows = 0;
    }

    /// `update` without the length check.
    fn add(&mut self, row: &[f64]) {
        for (i, &ri) in row.iter().enumerate() {
            if ri == 0.0 {
                continue;
            }
            let base = i * self.d;
            for (a, &rj) in self.ata[base..base + self.d].iter_mut().zip(row) {
                *a += ri * rj;
            }
        }
        self.frobenius_sq += linalg::norm_sq(row);
        self.rows += 1;
    }
}

/// Timestamped rows with exact covariance available at any past time.
///
/// Keeps every row, like the exact baseline it stands for. The covariance of
/// the full prefix is maintained incrementally; earlier prefixes are rebuilt
/// on request.
#[derive(Clone, Debug)]
pub struct ExactHistory {
    rows: Vec<(Timestamp, Vec<f64>)>,
    current: ExactCovariance,
}

impl ExactHistory {
    pub fn new(d: usize) -> Self {
        Self {
            rows: Vec::new(),
            current: ExactCovariance::new(d),
        }
    }

    pub fn dim(&self) -> usize {
        self.current.dim()
    }

    pub fn rows(&self) -> u64 {
        self.current.rows()
    }

    /// Covariance of every row pushed so far.
    pub fn current(&self) -> &ExactCovariance {
        &self.current
    }

    /// Record a row. Timestamps must be non-decreasing.
    pub fn push(&mut self, timestamp: Timestamp, row: &[f64]) -> Result<()> {
        if let Some(&(last, _)) = self.rows.last() {
            if timestamp < last {
                return Err(AttpError::OutOfOrder {
                    last,
                    got: timestamp,
                });
            }
        }
        self.current.update(row)?;
        self.rows.push((timestamp, row.to_vec()));
        Ok(())
    }

    /// Exact covariance of the rows with timestamp `≤ timestamp`.
    pub fn at(&self, timestamp: Timestamp) -> Cow<'_, ExactCovariance> {
        let end = self.rows.partition_point(|(ts, _)| *ts <= timestamp);
        if end == self.rows.len() {
            return Cow::Borrowed(&self.current);
        }
        let mut prefix = ExactCovariance::new(self.dim());
        for (_, row) in &self.rows[..end] {
            prefix.add(row);
        }
        Cow::Owned(prefix)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.current.clear();
    }
}

/// `‖AᵗA − BᵗB‖₂ / ‖A‖_F²` for a sketch answer `b`.
///
/// Zero when nothing has been observed yet.
///
/// # Panics
/// Panics if `b` does not have `exact.dim()` columns.
pub fn relative_spectral_error(exact: &ExactCovariance, b: &Matrix) -> f64 {
    assert_eq!(b.cols(), exact.dim(), "Sketch/exact dimension mismatch");
    if exact.frobenius_sq() == 0.0 {
        return 0.0;
    }
    let btb = b.gram();
    let diff: Vec<f64> = exact
        .covariance()
        .iter()
        .zip(btb.iter())
        .map(|(a, b)| a - b)
        .collect();
    linalg::symmetric_spectral_norm(&diff, exact.dim()) / exact.frobenius_sq()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_update_accumulates_outer_products() {
        let mut exact = ExactCovariance::new(2);
        exact.update(&[1.0, 2.0]).unwrap();
        exact.update(&[3.0, 0.0]).unwrap();
        assert_eq!(exact.covariance(), &[10.0, 2.0, 2.0, 4.0]);
        assert_eq!(exact.frobenius_sq(), 14.0);
        assert_eq!(exact.rows(), 2);
    }

    #[test]
    fn test_update_rejects_wrong_length() {
        let mut exact = ExactCovariance::new(3);
        assert!(matches!(
            exact.update(&[1.0]),
            Err(AttpError::DimensionMismatch { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn test_error_of_exact_answer_is_zero() {
        let rows = vec![vec![1.0, 2.0, 0.5], vec![-1.0, 0.0, 2.0]];
        let mut exact = ExactCovariance::new(3);
        for r in &rows {
            exact.update(r).unwrap();
        }
        let b = Matrix::from_rows(3, &rows);
        assert!(relative_spectral_error(&exact, &b) < 1e-12);
    }

    #[test]
    fn test_error_of_empty_answer_is_top_share() {
        let mut exact = ExactCovariance::new(2);
        exact.update(&[3.0, 0.0]).unwrap();
        exact.update(&[0.0, 1.0]).unwrap();
        let err = relative_spectral_error(&exact, &Matrix::empty(2));
        assert_relative_eq!(err, 9.0 / 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_history_answers_past_prefixes() {
        let mut history = ExactHistory::new(2);
        history.push(1, &[3.0, 0.0]).unwrap();
        history.push(2, &[0.0, 3.0]).unwrap();
        history.push(2, &[1.0, 1.0]).unwrap();
        history.push(4, &[4.0, 0.0]).unwrap();

        assert_eq!(history.at(0).rows(), 0);
        assert_eq!(history.at(1).covariance(), &[9.0, 0.0, 0.0, 0.0]);
        assert_eq!(history.at(3).covariance(), &[10.0, 1.0, 1.0, 10.0]);
        assert_eq!(history.at(3).frobenius_sq(), 20.0);
        assert!(matches!(history.at(4), Cow::Borrowed(_)));
        assert_eq!(history.at(99).rows(), 4);
        assert_eq!(history.current().frobenius_sq(), 36.0);
    }

    #[test]
    fn test_history_rejects_bad_rows() {
        let mut history = ExactHistory::new(2);
        history.push(5, &[1.0, 0.0]).unwrap();
        assert!(matches!(
            history.push(4, &[1.0, 0.0]),
            Err(AttpError::OutOfOrder { last: 5, got: 4 })
        ));
        assert!(history.push(6, &[1.0]).is_err());
        assert_eq!(history.rows(), 1);
        history.clear();
        assert_eq!(history.rows(), 0);
        history.push(0, &[0.0, 1.0]).unwrap();
    }

    #[test]
    fn test_error_before_data_is_zero() {
        let exact = ExactCovariance::new(4);
        assert_eq!(relative_spectral_error(&exact, &Matrix::empty(4)), 0.0);
    }
}
