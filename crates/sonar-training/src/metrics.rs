//! Epoch metrics collection and recording.
//!
//! This module provides [`Metrics`], the per-epoch summary handed to hooks,
//! and [`MetricsRecorder`], which accumulates batch errors over one pass.

use serde::{Deserialize, Serialize};

use crate::loss::ErrorSums;

/// Metrics of one training epoch.
///
/// `loss` is the mean squared error and `mae` the mean absolute error over
/// the training pass; the `val_` fields hold the same over the validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Training loss (MSE).
    pub loss: f64,
    /// Training mean absolute error.
    pub mae: f64,
    /// Validation loss, if a validation pass ran.
    pub val_loss: Option<f64>,
    /// Validation mean absolute error, if a validation pass ran.
    pub val_mae: Option<f64>,
}

impl Metrics {
    /// Creates metrics for a training pass.
    ///
    /// # Arguments
    ///
    /// * `epoch` - The 1-based epoch number.
    /// * `loss` - Mean squared error over the pass.
    /// * `mae` - Mean absolute error over the pass.
    ///
    /// # Examples
    ///
    /// ```
    /// use sonar_training::metrics::Metrics;
    ///
    /// let metrics = Metrics::new(1, 0.5, 0.6).with_validation(0.4, 0.5);
    /// assert_eq!(metrics.get("val_loss"), Some(0.4));
    /// assert_eq!(metrics.get("accuracy"), None);
    /// ```
    pub fn new(epoch: usize, loss: f64, mae: f64) -> Self {
        Self {
            epoch,
            loss,
            mae,
            val_loss: None,
            val_mae: None,
        }
    }

    /// Sets the validation metrics.
    pub fn with_validation(mut self, val_loss: f64, val_mae: f64) -> Self {
        self.val_loss = Some(val_loss);
        self.val_mae = Some(val_mae);
        self
    }

    /// Looks up a metric by its monitor name: `loss`, `mae`, `val_loss` or `val_mae`.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "loss" => Some(self.loss),
            "mae" => Some(self.mae),
            "val_loss" => self.val_loss,
            "val_mae" => self.val_mae,
            _ => None,
        }
    }
}

/// Accumulates batch errors over one pass.
///
/// Means are weighted by the number of compared values, so a short final
/// batch counts for what it holds.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    totals: ErrorSums,
    batches: u64,
}

impl MetricsRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the error sums of one batch.
    pub fn record(&mut self, sums: &ErrorSums) {
        self.totals.merge(sums);
        self.batches += 1;
    }

    /// Returns the number of batches recorded.
    pub fn count(&self) -> u64 {
        self.batches
    }

    /// Mean squared error over everything recorded, `0.0` if empty.
    pub fn average_loss(&self) -> f64 {
        self.totals.mse()
    }

    /// Mean absolute error over everything recorded, `0.0` if empty.
    pub fn average_mae(&self) -> f64 {
        self.totals.mae()
    }

    /// Builds training metrics for `epoch` from the recorded batches.
    ///
    /// # Examples
    ///
    /// ```
    /// use sonar_training::loss::ErrorSums;
    /// use sonar_training::metrics::MetricsRecorder;
    ///
    /// let mut recorder = MetricsRecorder::new();
    /// recorder.record(&ErrorSums { squared: 2.0, absolute: 2.0, count: 2 });
    /// recorder.record(&ErrorSums { squared: 0.0, absolute: 0.0, count: 2 });
    ///
    /// let metrics = recorder.aggregate(1);
    /// assert!((metrics.loss - 0.5).abs() < 1e-10);
    /// assert!((metrics.mae - 0.5).abs() < 1e-10);
    /// ```
    pub fn aggregate(&self, epoch: usize) -> Metrics {
        Metrics::new(epoch, self.average_loss(), self.average_mae())
    }

    /// Resets the recorder to its initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lookup() {
        let metrics = Metrics::new(3, 1.0, 0.8);
        assert_eq!(metrics.get("loss"), Some(1.0));
        assert_eq!(metrics.get("mae"), Some(0.8));
        assert_eq!(metrics.get("val_loss"), None);

        let metrics = metrics.with_validation(0.9, 0.7);
        assert_eq!(metrics.get("val_loss"), Some(0.9));
        assert_eq!(metrics.get("val_mae"), Some(0.7));
    }

    #[test]
    fn test_recorder_weights_by_count() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&ErrorSums {
            squared: 3.0,
            absolute: 3.0,
            count: 3,
        });
        recorder.record(&ErrorSums {
            squared: 0.0,
            absolute: 0.0,
            count: 1,
        });
        assert_eq!(recorder.count(), 2);
        assert!((recorder.average_loss() - 0.75).abs() < 1e-12);

        recorder.reset();
        assert_eq!(recorder.count(), 0);
        assert_eq!(recorder.average_mae(), 0.0);
    }

    #[test]
    fn test_metrics_serialization() {
        let metrics = Metrics::new(2, 0.25, 0.5).with_validation(0.3, 0.4);
        let json = serde_json::to_string(&metrics).unwrap();
        let back: Metrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metrics);
    }
}
