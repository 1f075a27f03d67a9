//! Error types for model building and training.

use sonar_checkpoint::CheckpointError;
use sonar_data::DataError;
use sonar_layers::LayerError;
use sonar_optimizer::OptimizerError;
use thiserror::Error;

use crate::hooks::HookError;

/// Errors raised while building, fitting or evaluating a model.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// A layer rejected its input or configuration.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// Invalid optimizer configuration.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// Loading, normalizing or windowing the dataset failed.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Writing or reading the model checkpoint failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A training hook failed.
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// A dataset partition is too short to produce a single window.
    #[error(
        "{partition} partition has {rows} rows, which yields no windows \
         (each window needs {span} rows plus {delay} rows of lookahead)"
    )]
    EmptyPartition {
        /// Partition name (`train`, `validation` or `test`)
        partition: String,
        /// Rows in the partition
        rows: usize,
        /// Raw rows covered by one window
        span: usize,
        /// Rows between a window start and its target
        delay: usize,
    },

    /// Predictions and targets cannot be paired up.
    #[error("Prediction shape {predictions:?} does not match {targets} targets")]
    TargetMismatch {
        /// Shape of the prediction tensor
        predictions: Vec<usize>,
        /// Number of targets
        targets: usize,
    },

    /// No epoch produced a finite validation loss, so nothing was saved.
    #[error("No checkpoint was written to {}: validation loss never improved", .0.display())]
    NoCheckpoint(std::path::PathBuf),

    /// Invalid model, fit or pipeline configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;
