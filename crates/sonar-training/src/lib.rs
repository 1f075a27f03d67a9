//! Model building, fitting and the end-to-end training run for sonar.
//!
//! This crate wires the layer, optimizer, data and checkpoint crates into a
//! single training session:
//!
//! - **Model**: [`SequentialModel`] assembled from a [`ModelConfig`]
//! - **Losses and metrics**: MSE loss, MAE metric, per-epoch [`Metrics`]
//! - **Hooks**: logging, best-only checkpointing and early stopping
//! - **Trainer**: epoch loop with per-parameter RMSprop state
//! - **Pipeline**: load, normalize, window, fit, reload and evaluate
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── run_pipeline ─────────────────────────────┐
//! │  SampleTable ─▶ NormalizationStats ─▶ TimeseriesDataset (x3)          │
//! │                                             │                         │
//! │                      ┌──────────────────────┴─────────┐               │
//! │                      ▼                                ▼               │
//! │               Trainer::fit ──▶ HookList          evaluate(test)       │
//! │                      │          (log, checkpoint,     ▲               │
//! │                      │           early stop)          │               │
//! │                      └──────▶ model.keras ──reload────┘               │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use sonar_training::{run_pipeline, LayerKind, PipelineConfig};
//!
//! let config = PipelineConfig::new("data/sensors.csv", "sonar")
//!     .with_layer(LayerKind::parse("LSTM"))
//!     .with_units(32)
//!     .with_epochs(10)
//!     .with_batch_size(64)
//!     .with_early_stopping(true)
//!     .with_dropout(0.2);
//!
//! let report = run_pipeline(&config).unwrap();
//! println!("{}", report.summary_line());
//! ```

pub mod error;
pub mod hooks;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod trainer;

// Re-export main types for convenience
pub use error::{Result, TrainingError};
pub use hooks::{
    EarlyStoppingHook, Hook, HookAction, HookError, HookList, HookResult, LoggingHook,
    ModelCheckpointHook,
};
pub use loss::{
    error_sums, mean_absolute_error, mean_squared_error, mean_squared_error_grad, ErrorSums,
};
pub use metrics::{Metrics, MetricsRecorder};
pub use model::{LayerKind, ModelConfig, SequentialModel};
pub use pipeline::{
    format_test_mae, run_pipeline, PipelineConfig, PipelineReport, EARLY_STOPPING_PATIENCE,
};
pub use trainer::{batch_inputs, evaluate, Evaluation, FitConfig, History, Trainer};
