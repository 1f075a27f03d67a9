//! Regression losses.
//!
//! Predictions carry one or more values per target: a `[batch, 1]` head
//! pairs one value with each target, a `[batch, time, 1]` head pairs every
//! timestep of a sample with that sample's target.

use sonar_layers::Tensor;

use crate::error::{Result, TrainingError};

/// Running sums of squared and absolute errors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorSums {
    /// Sum of squared errors
    pub squared: f64,
    /// Sum of absolute errors
    pub absolute: f64,
    /// Number of compared values
    pub count: usize,
}

impl ErrorSums {
    /// Adds another set of sums into this one.
    pub fn merge(&mut self, other: &ErrorSums) {
        self.squared += other.squared;
        self.absolute += other.absolute;
        self.count += other.count;
    }

    /// Mean squared error, `0.0` when nothing was compared.
    pub fn mse(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.squared / self.count as f64
        }
    }

    /// Mean absolute error, `0.0` when nothing was compared.
    pub fn mae(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.absolute / self.count as f64
        }
    }
}

/// Number of prediction values paired with each target.
fn values_per_target(predictions: &Tensor, targets: &[f32]) -> Result<usize> {
    let numel = predictions.numel();
    if targets.is_empty() || numel == 0 || numel % targets.len() != 0 {
        return Err(TrainingError::TargetMismatch {
            predictions: predictions.shape().to_vec(),
            targets: targets.len(),
        });
    }
    Ok(numel / targets.len())
}

/// Squared and absolute error sums between `predictions` and `targets`.
///
/// # Errors
///
/// Returns [`TrainingError::TargetMismatch`] if the prediction count is not a
/// positive multiple of the target count.
pub fn error_sums(predictions: &Tensor, targets: &[f32]) -> Result<ErrorSums> {
    let per_target = values_per_target(predictions, targets)?;
    let mut sums = ErrorSums::default();
    for (chunk, &target) in predictions.data().chunks(per_target).zip(targets) {
        for &p in chunk {
            let diff = (p - target) as f64;
            sums.squared += diff * diff;
            sums.absolute += diff.abs();
        }
    }
    sums.count = predictions.numel();
    Ok(sums)
}

/// Mean squared error.
pub fn mean_squared_error(predictions: &Tensor, targets: &[f32]) -> Result<f64> {
    Ok(error_sums(predictions, targets)?.mse())
}

/// Mean absolute error.
pub fn mean_absolute_error(predictions: &Tensor, targets: &[f32]) -> Result<f64> {
    Ok(error_sums(predictions, targets)?.mae())
}

/// Gradient of the mean squared error with respect to `predictions`.
pub fn mean_squared_error_grad(predictions: &Tensor, targets: &[f32]) -> Result<Tensor> {
    let per_target = values_per_target(predictions, targets)?;
    let scale = 2.0 / predictions.numel() as f32;
    let mut grad = predictions.clone();
    for (chunk, &target) in grad.data_mut().chunks_mut(per_target).zip(targets) {
        for p in chunk {
            *p = scale * (*p - target);
        }
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_output() {
        let predictions = Tensor::from_data(&[3, 1], vec![1.0, 2.0, 4.0]);
        let targets = [1.0, 0.0, 5.0];
        assert!((mean_squared_error(&predictions, &targets).unwrap() - 5.0 / 3.0).abs() < 1e-9);
        assert!((mean_absolute_error(&predictions, &targets).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_broadcast_over_timesteps() {
        // two samples, three timesteps each
        let predictions = Tensor::from_data(&[2, 3, 1], vec![1.0, 1.0, 1.0, 0.0, 2.0, 4.0]);
        let targets = [1.0, 2.0];
        let sums = error_sums(&predictions, &targets).unwrap();
        assert_eq!(sums.count, 6);
        assert!((sums.squared - 8.0).abs() < 1e-9);
        assert!((sums.absolute - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatch() {
        let predictions = Tensor::zeros(&[3, 1]);
        assert!(matches!(
            error_sums(&predictions, &[0.0, 0.0]),
            Err(TrainingError::TargetMismatch { .. })
        ));
        assert!(error_sums(&predictions, &[]).is_err());
    }

    #[test]
    fn test_grad_matches_finite_differences() {
        let predictions = Tensor::from_data(&[2, 2, 1], vec![0.5, -1.0, 2.0, 0.0]);
        let targets = [0.0, 1.0];
        let grad = mean_squared_error_grad(&predictions, &targets).unwrap();

        let eps = 1e-3;
        for idx in 0..predictions.numel() {
            let mut plus = predictions.clone();
            plus.data_mut()[idx] += eps;
            let mut minus = predictions.clone();
            minus.data_mut()[idx] -= eps;
            let numeric = (mean_squared_error(&plus, &targets).unwrap()
                - mean_squared_error(&minus, &targets).unwrap())
                / (2.0 * eps as f64);
            assert!((numeric - grad.data()[idx] as f64).abs() < 1e-3);
        }
    }

    #[test]
    fn test_merge() {
        let mut total = ErrorSums::default();
        total.merge(&ErrorSums {
            squared: 4.0,
            absolute: 2.0,
            count: 1,
        });
        total.merge(&ErrorSums {
            squared: 0.0,
            absolute: 0.0,
            count: 3,
        });
        assert_eq!(total.mse(), 1.0);
        assert_eq!(total.mae(), 0.5);
        assert_eq!(ErrorSums::default().mse(), 0.0);
    }
}
