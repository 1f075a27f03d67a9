//! Epoch-based fitting and evaluation.
//!
//! The [`Trainer`] drives a [`SequentialModel`] over a training dataset,
//! evaluates on a validation dataset after every epoch and hands the epoch's
//! [`Metrics`] to its hooks.
//!
//! Two batch sizes are in play. The dataset groups windows into batches of
//! its own size; the fit batch size splits each of those into steps, with one
//! optimizer update per step.

use serde::{Deserialize, Serialize};
use sonar_data::{TimeseriesDataset, WindowBatch};
use sonar_layers::Tensor;
use sonar_optimizer::{create_optimizer, OptimizerConfig, OptimizerDyn};
use tracing::{debug, info};

use crate::error::{Result, TrainingError};
use crate::hooks::{Hook, HookAction, HookList};
use crate::loss::{error_sums, mean_squared_error_grad, ErrorSums};
use crate::metrics::{Metrics, MetricsRecorder};
use crate::model::SequentialModel;

/// Configuration for [`Trainer::fit`].
///
/// # Examples
///
/// ```
/// use sonar_training::trainer::FitConfig;
///
/// let config = FitConfig::default().with_epochs(10).with_batch_size(64);
/// assert_eq!(config.optimizer.name(), "Rmsprop");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Windows per optimizer step.
    pub batch_size: usize,
    /// Optimizer applied to every parameter tensor.
    pub optimizer: OptimizerConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 32,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl FitConfig {
    /// Sets the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the number of windows per optimizer step.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Checks that epochs and batch size are positive and the optimizer is valid.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainingError::InvalidConfig(
                "epochs must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        self.optimizer.validate()?;
        Ok(())
    }
}

/// Per-epoch record of a fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    /// Metrics of every completed epoch, in order.
    pub epochs: Vec<Metrics>,
    /// Whether a hook ended training before the last configured epoch.
    pub stopped_early: bool,
}

impl History {
    /// Number of completed epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether no epoch completed.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Metrics of the last completed epoch.
    pub fn last(&self) -> Option<&Metrics> {
        self.epochs.last()
    }

    /// Epoch with the lowest validation loss; the earliest one wins ties.
    pub fn best_epoch(&self) -> Option<&Metrics> {
        self.epochs
            .iter()
            .filter(|m| m.val_loss.map_or(false, |v| !v.is_nan()))
            .fold(None, |best: Option<&Metrics>, m| match best {
                Some(b) if b.val_loss <= m.val_loss => Some(b),
                _ => Some(m),
            })
    }
}

/// Loss and MAE over one dataset pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean squared error.
    pub loss: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Windows evaluated.
    pub num_windows: usize,
}

/// Input tensor `[batch, sequence_length, num_features]` of a window batch.
pub fn batch_inputs(batch: &WindowBatch) -> Tensor {
    Tensor::from_data(&batch.input_shape(), batch.inputs.clone())
}

/// Evaluates `model` on one pass over `data` in inference mode.
///
/// `batch_size` only bounds how many windows go through the model at once.
///
/// # Errors
///
/// Returns [`TrainingError::InvalidConfig`] if the dataset is empty or the
/// batch size is zero.
pub fn evaluate(
    model: &SequentialModel,
    data: &mut TimeseriesDataset,
    batch_size: usize,
) -> Result<Evaluation> {
    if batch_size == 0 {
        return Err(TrainingError::InvalidConfig(
            "batch_size must be greater than zero".to_string(),
        ));
    }
    if data.is_empty() {
        return Err(TrainingError::InvalidConfig(
            "cannot evaluate on a dataset without windows".to_string(),
        ));
    }

    let mut totals = ErrorSums::default();
    let mut num_windows = 0;
    for batch in data.epoch() {
        for chunk in batch.chunks(batch_size) {
            let predictions = model.forward(&batch_inputs(&chunk))?;
            totals.merge(&error_sums(&predictions, &chunk.targets)?);
            num_windows += chunk.len();
        }
    }
    Ok(Evaluation {
        loss: totals.mse(),
        mae: totals.mae(),
        num_windows,
    })
}

/// Fits a model with per-parameter optimizer state and epoch hooks.
pub struct Trainer {
    config: FitConfig,
    optimizers: Vec<Box<dyn OptimizerDyn>>,
    hooks: HookList,
}

impl Trainer {
    /// Creates a trainer.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`FitConfig::validate`].
    pub fn new(config: FitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            optimizers: Vec::new(),
            hooks: HookList::new(),
        })
    }

    /// Adds a hook.
    pub fn add_hook<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.add(hook);
    }

    /// Returns the fit configuration.
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Trains for up to `epochs` epochs, validating after each.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] for empty datasets and
    /// propagates model, loss and hook failures.
    pub fn fit(
        &mut self,
        model: &mut SequentialModel,
        train: &mut TimeseriesDataset,
        validation: &mut TimeseriesDataset,
    ) -> Result<History> {
        if train.is_empty() {
            return Err(TrainingError::InvalidConfig(
                "cannot fit on a dataset without windows".to_string(),
            ));
        }
        info!(
            "Training on {} windows, validating on {} windows",
            train.len(),
            validation.len()
        );

        let mut history = History::default();
        for epoch in 1..=self.config.epochs {
            self.hooks.before_epoch(epoch)?;

            model.set_training(true);
            let mut recorder = MetricsRecorder::new();
            for batch in train.epoch() {
                for chunk in batch.chunks(self.config.batch_size) {
                    let sums = self.train_step(model, &chunk)?;
                    recorder.record(&sums);
                }
            }
            model.set_training(false);
            debug!(epoch, steps = recorder.count(), "Finished training pass");

            let val = evaluate(model, validation, self.config.batch_size)?;
            let metrics = recorder.aggregate(epoch).with_validation(val.loss, val.mae);
            history.epochs.push(metrics.clone());

            if self.hooks.after_epoch(&metrics, model)? == HookAction::Stop {
                info!("Training stopped by hook at epoch {}", epoch);
                history.stopped_early = epoch < self.config.epochs;
                break;
            }
        }

        self.hooks.end(history.last())?;
        Ok(history)
    }

    /// Runs one forward/backward pass and optimizer update on `batch`.
    ///
    /// Returns the batch's error sums, computed on the training-mode output.
    pub fn train_step(
        &mut self,
        model: &mut SequentialModel,
        batch: &WindowBatch,
    ) -> Result<ErrorSums> {
        let predictions = model.forward_train(&batch_inputs(batch))?;
        let sums = error_sums(&predictions, &batch.targets)?;
        let grad = mean_squared_error_grad(&predictions, &batch.targets)?;
        model.backward(&grad)?;
        self.apply_gradients(model)?;
        Ok(sums)
    }

    fn apply_gradients(&mut self, model: &mut SequentialModel) -> Result<()> {
        let num_params = model.parameters().len();
        if self.optimizers.len() != num_params {
            self.optimizers = (0..num_params)
                .map(|_| create_optimizer(self.config.optimizer.clone()))
                .collect::<std::result::Result<_, _>>()?;
        }

        let grads: Vec<Vec<f32>> = model
            .gradients()
            .iter()
            .map(|g| g.data().to_vec())
            .collect();
        for ((param, grad), optimizer) in model
            .parameters_mut()
            .into_iter()
            .zip(&grads)
            .zip(self.optimizers.iter_mut())
        {
            optimizer.apply_gradients(param.data_mut(), grad);
        }
        Ok(())
    }
}
