//! Column standardization fitted on the train partition.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::table::FeatureMatrix;

/// Per-column mean and population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl NormalizationStats {
    /// Computes statistics over rows `[0, num_train)` only.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `num_train` is zero or exceeds
    /// the matrix, and [`DataError::ZeroVariance`] for a column that is
    /// constant over those rows.
    pub fn fit(matrix: &FeatureMatrix, num_train: usize) -> Result<Self> {
        if num_train == 0 || num_train > matrix.num_rows() {
            return Err(DataError::InvalidConfig(format!(
                "cannot fit normalization on {} of {} rows",
                num_train,
                matrix.num_rows()
            )));
        }

        let cols = matrix.num_cols();
        let n = num_train as f64;
        let mut mean = vec![0.0f64; cols];
        for i in 0..num_train {
            for (m, &v) in mean.iter_mut().zip(matrix.row(i)) {
                *m += v as f64;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0f64; cols];
        for i in 0..num_train {
            for ((s, &v), m) in var.iter_mut().zip(matrix.row(i)).zip(&mean) {
                let d = v as f64 - m;
                *s += d * d;
            }
        }

        let mut std = Vec::with_capacity(cols);
        for (col, s) in var.iter().enumerate() {
            let first = matrix.get(0, col);
            let constant = (1..num_train).all(|i| matrix.get(i, col) == first);
            if constant {
                return Err(DataError::ZeroVariance {
                    column: matrix.column_names()[col].clone(),
                    rows: num_train,
                });
            }
            std.push((s / n).sqrt());
        }

        debug!(?mean, ?std, rows = num_train, "Fitted normalization statistics");
        Ok(Self { mean, std })
    }

    /// Column means.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Column standard deviations.
    pub fn std(&self) -> &[f64] {
        &self.std
    }

    /// Standardizes every row of `matrix` in place: `(x - mean) / std`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ShapeMismatch`] if the column counts differ.
    pub fn apply(&self, matrix: &mut FeatureMatrix) -> Result<()> {
        let cols = matrix.num_cols();
        if cols != self.mean.len() {
            return Err(DataError::ShapeMismatch {
                expected: self.mean.len(),
                actual: cols,
            });
        }

        for row in matrix.data_mut().chunks_mut(cols) {
            for ((v, m), s) in row.iter_mut().zip(&self.mean).zip(&self.std) {
                *v = ((*v as f64 - m) / s) as f32;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, data: Vec<f32>) -> FeatureMatrix {
        let cols = data.len() / rows;
        let names = (0..cols).map(|c| format!("c{}", c)).collect();
        FeatureMatrix::new(rows, cols, data, names).unwrap()
    }

    #[test]
    fn test_train_rows_are_standardized() {
        let mut m = matrix(
            6,
            vec![
                1.0, 10.0, //
                2.0, 20.0, //
                3.0, 30.0, //
                4.0, 40.0, //
                100.0, -5.0, //
                -50.0, 7.0,
            ],
        );
        let stats = NormalizationStats::fit(&m, 4).unwrap();
        assert!((stats.mean()[0] - 2.5).abs() < 1e-9);
        // population std of 1..4
        assert!((stats.std()[0] - 1.25f64.sqrt()).abs() < 1e-9);

        stats.apply(&mut m).unwrap();
        for col in 0..2 {
            let values: Vec<f64> = (0..4).map(|i| m.get(i, col) as f64).collect();
            let mean = values.iter().sum::<f64>() / 4.0;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
            assert!(mean.abs() < 1e-6);
            assert!((var.sqrt() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_stats_ignore_rows_after_train() {
        let a = matrix(4, vec![1.0, 2.0, 3.0, 4.0]);
        let b = matrix(4, vec![1.0, 2.0, 300.0, -4000.0]);
        assert_eq!(
            NormalizationStats::fit(&a, 2).unwrap(),
            NormalizationStats::fit(&b, 2).unwrap()
        );
    }

    #[test]
    fn test_zero_variance_is_rejected() {
        let m = matrix(3, vec![1.0, 5.0, 2.0, 5.0, 3.0, 6.0]);
        match NormalizationStats::fit(&m, 2).unwrap_err() {
            DataError::ZeroVariance { column, rows } => {
                assert_eq!(column, "c1");
                assert_eq!(rows, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_apply_rejects_other_width() {
        let stats = NormalizationStats::fit(&matrix(2, vec![1.0, 2.0]), 2).unwrap();
        let mut wide = matrix(1, vec![1.0, 2.0]);
        assert!(matches!(
            stats.apply(&mut wide),
            Err(DataError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fit_requires_rows() {
        let m = matrix(2, vec![1.0, 2.0]);
        assert!(NormalizationStats::fit(&m, 0).is_err());
        assert!(NormalizationStats::fit(&m, 3).is_err());
    }
}
