//! End-to-end training run.
//!
//! [`run_pipeline`] loads the CSV, normalizes it with train statistics,
//! builds the three window datasets, fits the model with best-only
//! checkpointing, then reloads the checkpoint from disk and scores it on the
//! test partition.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sonar_checkpoint::{Checkpointer, JsonCheckpointer};
use sonar_data::{
    FeatureMatrix, NormalizationStats, PartitionSizes, SampleTable, TargetSelection,
    TimeseriesDataset, WindowConfig,
};
use tracing::{info, warn};

use crate::error::{Result, TrainingError};
use crate::hooks::{EarlyStoppingHook, LoggingHook, ModelCheckpointHook};
use crate::model::{LayerKind, ModelConfig, SequentialModel};
use crate::trainer::{evaluate, Evaluation, FitConfig, History, Trainer};

/// Patience of the early stopping hook, in epochs.
pub const EARLY_STOPPING_PATIENCE: usize = 3;

/// Everything one training run needs.
///
/// # Examples
///
/// ```
/// use sonar_training::model::LayerKind;
/// use sonar_training::pipeline::PipelineConfig;
///
/// let config = PipelineConfig::new("data/sensors.csv", "sonar")
///     .with_layer(LayerKind::parse("LSTM"))
///     .with_units(32)
///     .with_dropout(0.2);
/// assert_eq!(config.checkpoint_path().to_str(), Some("scripts/sonar.keras"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// CSV file with a header row and an identifier first column.
    pub dataset: PathBuf,
    /// Checkpoint base name, without extension.
    pub output_model: String,
    /// Directory receiving the checkpoint.
    pub output_dir: PathBuf,
    /// Recurrent layer family.
    pub layer: LayerKind,
    /// LSTM units.
    pub units: usize,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Windows per optimizer step.
    pub batch_size: usize,
    /// Stop once `val_loss` has not improved for a few epochs.
    pub early_stopping: bool,
    /// Dropout and recurrent dropout rate.
    pub dropout: f32,
    /// Which numeric column is the target.
    pub target: TargetSelection,
    /// Window geometry.
    pub window: WindowConfig,
    /// Seed for initialization, dropout and shuffling.
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::new(),
            output_model: "model".to_string(),
            output_dir: PathBuf::from("scripts"),
            layer: LayerKind::Lstm,
            units: 32,
            epochs: 1,
            batch_size: 32,
            early_stopping: false,
            dropout: 0.0,
            target: TargetSelection::default(),
            window: WindowConfig::default(),
            seed: 1337,
        }
    }
}

impl PipelineConfig {
    /// Creates a config with default hyper-parameters.
    pub fn new(dataset: impl Into<PathBuf>, output_model: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            output_model: output_model.into(),
            ..Self::default()
        }
    }

    /// Sets the checkpoint directory.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Sets the recurrent layer family.
    pub fn with_layer(mut self, layer: LayerKind) -> Self {
        self.layer = layer;
        self
    }

    /// Sets the LSTM units.
    pub fn with_units(mut self, units: usize) -> Self {
        self.units = units;
        self
    }

    /// Sets the maximum number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the windows per optimizer step.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enables or disables early stopping.
    pub fn with_early_stopping(mut self, early_stopping: bool) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    /// Sets the dropout rate.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Sets the target column.
    pub fn with_target(mut self, target: TargetSelection) -> Self {
        self.target = target;
        self
    }

    /// Sets the window geometry.
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// `<output_dir>/<output_model>.keras`.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.keras", self.output_model))
    }

    /// Fit settings derived from this config.
    pub fn fit_config(&self) -> FitConfig {
        FitConfig::default()
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size)
    }

    /// Model settings for a dataset with `num_features` feature columns.
    pub fn model_config(&self, num_features: usize) -> ModelConfig {
        ModelConfig::default()
            .with_layer(self.layer.clone())
            .with_units(self.units)
            .with_dropout(self.dropout)
            .with_input(self.window.sequence_length, num_features)
            .with_seed(self.seed)
    }

    /// Checks the settings that do not depend on the data.
    pub fn validate(&self) -> Result<()> {
        if self.output_model.is_empty() {
            return Err(TrainingError::InvalidConfig(
                "output model name must not be empty".to_string(),
            ));
        }
        if self.units == 0 {
            return Err(TrainingError::InvalidConfig(
                "units must be greater than zero".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainingError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        self.fit_config().validate()?;
        self.window.validate()?;
        Ok(())
    }
}

/// Outcome of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Reloaded checkpoint scored on the test partition.
    pub test: Evaluation,
    /// Where the best model was written.
    pub checkpoint_path: PathBuf,
    /// Per-epoch metrics.
    pub history: History,
    /// Train-partition normalization statistics.
    pub normalization: NormalizationStats,
}

impl PipelineReport {
    /// Test mean absolute error.
    pub fn test_mae(&self) -> f64 {
        self.test.mae
    }

    /// The final report line.
    pub fn summary_line(&self) -> String {
        format_test_mae(self.test.mae)
    }
}

/// Formats `Test MAE: x.xxxx`.
///
/// ```
/// assert_eq!(sonar_training::pipeline::format_test_mae(0.123456), "Test MAE: 0.1235");
/// ```
pub fn format_test_mae(mae: f64) -> String {
    format!("Test MAE: {:.4}", mae)
}

/// Window dataset over one partition, rejected if it yields no window.
fn partition_dataset(
    name: &str,
    features: &Arc<FeatureMatrix>,
    targets: &Arc<[f32]>,
    window: WindowConfig,
    rows: Range<usize>,
    bounded: bool,
) -> Result<TimeseriesDataset> {
    let end = if bounded { Some(rows.end) } else { None };
    let dataset = TimeseriesDataset::new(
        Arc::clone(features),
        Arc::clone(targets),
        window,
        rows.start,
        end,
    )?;
    if dataset.is_empty() {
        return Err(TrainingError::EmptyPartition {
            partition: name.to_string(),
            rows: rows.len(),
            span: window.span(),
            delay: window.delay(),
        });
    }
    info!(
        partition = name,
        rows = rows.len(),
        windows = dataset.len(),
        batches = dataset.num_batches(),
        "Prepared window dataset"
    );
    Ok(dataset)
}

/// Loads and normalizes the dataset, then builds the train, validation and
/// test window datasets.
fn prepare_datasets(
    config: &PipelineConfig,
) -> Result<([TimeseriesDataset; 3], NormalizationStats, usize)> {
    let table = SampleTable::load(&config.dataset)?;
    let (mut features, targets) = table.split_target(&config.target)?;

    let sizes = PartitionSizes::new(features.num_rows());
    info!(
        train = sizes.num_train,
        validation = sizes.num_val,
        test = sizes.num_test,
        "Partitioned rows"
    );

    let stats = NormalizationStats::fit(&features, sizes.num_train)?;
    stats.apply(&mut features)?;

    let num_features = features.num_cols();
    let features = Arc::new(features);
    let targets: Arc<[f32]> = targets.into();
    let window = config.window;

    let train = partition_dataset("train", &features, &targets, window, sizes.train_range(), true)?
        .with_shuffle(config.seed.wrapping_add(1));
    let validation = partition_dataset(
        "validation",
        &features,
        &targets,
        window,
        sizes.val_range(),
        true,
    )?
    .with_shuffle(config.seed.wrapping_add(2));
    let test = partition_dataset("test", &features, &targets, window, sizes.test_range(), false)?;

    Ok(([train, validation, test], stats, num_features))
}

/// Runs a full training session and reports the test MAE of the best checkpoint.
///
/// # Errors
///
/// Fails on invalid configuration, unreadable or malformed data, partitions
/// too short for the window geometry, checkpoint I/O, and when no epoch
/// produced a checkpoint.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;
    match serde_json::to_string(config) {
        Ok(json) => info!(config = %json, "Starting training run"),
        Err(e) => warn!(error = %e, "Could not serialize the run configuration"),
    }

    let ([mut train, mut validation, mut test], normalization, num_features) =
        prepare_datasets(config)?;

    let mut model = SequentialModel::build(&config.model_config(num_features))?;
    info!("\n{}", model.summary());

    let checkpoint_path = config.checkpoint_path();
    let mut trainer = Trainer::new(config.fit_config())?;
    trainer.add_hook(LoggingHook::new(config.epochs));
    trainer.add_hook(ModelCheckpointHook::new(&checkpoint_path));
    if config.early_stopping {
        trainer.add_hook(EarlyStoppingHook::new("val_loss", EARLY_STOPPING_PATIENCE));
    }

    let history = trainer.fit(&mut model, &mut train, &mut validation)?;
    let best = history
        .best_epoch()
        .ok_or_else(|| TrainingError::NoCheckpoint(checkpoint_path.clone()))?;
    info!(
        epoch = best.epoch,
        val_loss = best.val_loss.unwrap_or(f64::NAN),
        "Best epoch"
    );

    let state = JsonCheckpointer::new().restore(&checkpoint_path)?;
    let restored = SequentialModel::from_state(&state, config.seed)?;
    let test_eval = evaluate(&restored, &mut test, config.batch_size)?;
    info!(
        loss = test_eval.loss,
        mae = test_eval.mae,
        windows = test_eval.num_windows,
        "Evaluated restored model on test windows"
    );

    Ok(PipelineReport {
        test: test_eval,
        checkpoint_path,
        history,
        normalization,
    })
}
