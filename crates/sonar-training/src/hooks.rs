//! Training hooks for customizing the fit loop.
//!
//! Hooks run around every epoch and may stop training early. The trainer
//! owns a [`HookList`]; the pipeline installs logging, best-only
//! checkpointing and (optionally) early stopping.

use std::path::{Path, PathBuf};
use std::time::Instant;

use sonar_checkpoint::{CheckpointError, Checkpointer, JsonCheckpointer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::model::SequentialModel;

/// Errors that can occur during hook execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// Saving a checkpoint failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A custom hook error.
    #[error("Hook error: {0}")]
    Custom(String),
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Action to take after a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Continue training normally.
    Continue,
    /// Stop training after this epoch.
    Stop,
}

/// Trait for training hooks.
///
/// # Examples
///
/// ```
/// use sonar_training::hooks::{Hook, HookAction, HookResult};
/// use sonar_training::metrics::Metrics;
/// use sonar_training::model::SequentialModel;
///
/// struct PrintLoss;
///
/// impl Hook for PrintLoss {
///     fn name(&self) -> &str {
///         "print_loss"
///     }
///
///     fn after_epoch(
///         &mut self,
///         metrics: &Metrics,
///         _model: &SequentialModel,
///     ) -> HookResult<HookAction> {
///         println!("epoch {}: loss = {}", metrics.epoch, metrics.loss);
///         Ok(HookAction::Continue)
///     }
/// }
/// ```
pub trait Hook: Send + Sync {
    /// Returns the name of this hook for logging purposes.
    fn name(&self) -> &str;

    /// Called before each epoch.
    ///
    /// # Arguments
    ///
    /// * `epoch` - The 1-based epoch about to run.
    fn before_epoch(&mut self, _epoch: usize) -> HookResult<()> {
        Ok(())
    }

    /// Called after each epoch's training and validation passes.
    ///
    /// # Arguments
    ///
    /// * `metrics` - The metrics of the finished epoch.
    /// * `model` - The model as trained so far.
    ///
    /// # Returns
    ///
    /// A `HookAction` indicating whether to continue or stop training.
    fn after_epoch(
        &mut self,
        _metrics: &Metrics,
        _model: &SequentialModel,
    ) -> HookResult<HookAction> {
        Ok(HookAction::Continue)
    }

    /// Called once when training ends, with the last epoch's metrics.
    fn end(&mut self, _metrics: Option<&Metrics>) -> HookResult<()> {
        Ok(())
    }
}

/// Strict improvement test shared by the monitoring hooks. NaN never improves.
fn improves(current: f64, best: Option<f64>, min_delta: f64) -> bool {
    if current.is_nan() {
        return false;
    }
    match best {
        None => true,
        Some(best) => current < best - min_delta,
    }
}

/// Logs one line per epoch with its duration and metrics.
#[derive(Debug)]
pub struct LoggingHook {
    total_epochs: usize,
    started: Option<Instant>,
}

impl LoggingHook {
    /// Creates a logging hook for a run of `total_epochs` epochs.
    pub fn new(total_epochs: usize) -> Self {
        Self {
            total_epochs,
            started: None,
        }
    }

    /// Formats the epoch line, e.g.
    /// `Epoch 2/10 - 3s - loss: 0.4211 - mae: 0.5012 - val_loss: 0.3987 - val_mae: 0.4873`.
    pub fn format_line(&self, metrics: &Metrics, elapsed_secs: u64) -> String {
        let mut line = format!(
            "Epoch {}/{} - {}s - loss: {:.4} - mae: {:.4}",
            metrics.epoch, self.total_epochs, elapsed_secs, metrics.loss, metrics.mae
        );
        if let Some(val_loss) = metrics.val_loss {
            line.push_str(&format!(" - val_loss: {:.4}", val_loss));
        }
        if let Some(val_mae) = metrics.val_mae {
            line.push_str(&format!(" - val_mae: {:.4}", val_mae));
        }
        line
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging_hook"
    }

    fn before_epoch(&mut self, _epoch: usize) -> HookResult<()> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn after_epoch(
        &mut self,
        metrics: &Metrics,
        _model: &SequentialModel,
    ) -> HookResult<HookAction> {
        let elapsed = self.started.map(|t| t.elapsed().as_secs()).unwrap_or(0);
        info!("{}", self.format_line(metrics, elapsed));
        Ok(HookAction::Continue)
    }
}

/// Writes the model to a fixed path whenever the monitored metric improves.
pub struct ModelCheckpointHook {
    path: PathBuf,
    monitor: String,
    save_best_only: bool,
    best_value: Option<f64>,
    saved: usize,
    checkpointer: Box<dyn Checkpointer>,
}

impl std::fmt::Debug for ModelCheckpointHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCheckpointHook")
            .field("path", &self.path)
            .field("monitor", &self.monitor)
            .field("save_best_only", &self.save_best_only)
            .field("best_value", &self.best_value)
            .field("saved", &self.saved)
            .finish_non_exhaustive()
    }
}

impl ModelCheckpointHook {
    /// Creates a best-only checkpoint hook monitoring `val_loss`, writing JSON.
    ///
    /// # Arguments
    ///
    /// * `path` - The checkpoint file, overwritten on every save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            monitor: "val_loss".to_string(),
            save_best_only: true,
            best_value: None,
            saved: 0,
            checkpointer: Box::new(JsonCheckpointer::new()),
        }
    }

    /// Sets the monitored metric (lower is better).
    pub fn with_monitor(mut self, monitor: impl Into<String>) -> Self {
        self.monitor = monitor.into();
        self
    }

    /// Saves after every epoch instead of only on improvement.
    pub fn with_save_best_only(mut self, save_best_only: bool) -> Self {
        self.save_best_only = save_best_only;
        self
    }

    /// Replaces the checkpoint writer.
    pub fn with_checkpointer(mut self, checkpointer: Box<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// The checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best monitored value seen so far.
    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    /// Number of checkpoints written.
    pub fn saved(&self) -> usize {
        self.saved
    }

    fn save(&mut self, metrics: &Metrics, model: &SequentialModel) -> HookResult<()> {
        let mut state = model.to_state(metrics.epoch);
        state.set_metadata("monitor", self.monitor.clone());
        if let Some(value) = metrics.get(&self.monitor) {
            state.set_metadata(self.monitor.clone(), value.to_string());
        }
        self.checkpointer.save(&self.path, &state)?;
        self.saved += 1;
        Ok(())
    }
}

impl Hook for ModelCheckpointHook {
    fn name(&self) -> &str {
        "model_checkpoint_hook"
    }

    fn after_epoch(
        &mut self,
        metrics: &Metrics,
        model: &SequentialModel,
    ) -> HookResult<HookAction> {
        let current = match metrics.get(&self.monitor) {
            Some(v) => v,
            None => {
                warn!(
                    "ModelCheckpointHook: metric '{}' not found in metrics",
                    self.monitor
                );
                return Ok(HookAction::Continue);
            }
        };

        if improves(current, self.best_value, 0.0) {
            info!(
                "Epoch {}: {} improved from {} to {:.5}, saving model to {}",
                metrics.epoch,
                self.monitor,
                self.best_value
                    .map_or_else(|| "inf".to_string(), |b| format!("{:.5}", b)),
                current,
                self.path.display()
            );
            self.best_value = Some(current);
            self.save(metrics, model)?;
        } else if self.save_best_only {
            debug!(
                "Epoch {}: {} did not improve from {:?}",
                metrics.epoch, self.monitor, self.best_value
            );
        } else {
            self.save(metrics, model)?;
        }
        Ok(HookAction::Continue)
    }
}

/// Stops training when the monitored metric stops improving.
///
/// # Examples
///
/// ```
/// use sonar_training::hooks::EarlyStoppingHook;
///
/// // Stop after 3 epochs without val_loss improvement
/// let hook = EarlyStoppingHook::new("val_loss", 3);
/// ```
#[derive(Debug)]
pub struct EarlyStoppingHook {
    metric_name: String,
    patience: usize,
    min_delta: f64,
    best_value: Option<f64>,
    best_epoch: usize,
    epochs_without_improvement: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStoppingHook {
    /// Creates an early stopping hook for a lower-is-better metric.
    ///
    /// # Arguments
    ///
    /// * `metric_name` - The metric to monitor, e.g. `val_loss`.
    /// * `patience` - Epochs without improvement before stopping.
    pub fn new(metric_name: impl Into<String>, patience: usize) -> Self {
        Self {
            metric_name: metric_name.into(),
            patience,
            min_delta: 0.0,
            best_value: None,
            best_epoch: 0,
            epochs_without_improvement: 0,
            stopped_epoch: None,
        }
    }

    /// Sets the minimum decrease that counts as an improvement.
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Best value seen so far.
    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    /// Epoch at which training was stopped, if it was.
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl Hook for EarlyStoppingHook {
    fn name(&self) -> &str {
        "early_stopping_hook"
    }

    fn after_epoch(
        &mut self,
        metrics: &Metrics,
        _model: &SequentialModel,
    ) -> HookResult<HookAction> {
        let current = match metrics.get(&self.metric_name) {
            Some(v) => v,
            None => {
                warn!(
                    "EarlyStoppingHook: metric '{}' not found in metrics",
                    self.metric_name
                );
                return Ok(HookAction::Continue);
            }
        };

        if improves(current, self.best_value, self.min_delta) {
            debug!(
                "EarlyStoppingHook: {} improved from {:?} to {} at epoch {}",
                self.metric_name, self.best_value, current, metrics.epoch
            );
            self.best_value = Some(current);
            self.best_epoch = metrics.epoch;
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
            debug!(
                "EarlyStoppingHook: no improvement for {} epochs (patience: {})",
                self.epochs_without_improvement, self.patience
            );

            if self.epochs_without_improvement >= self.patience {
                info!(
                    "EarlyStoppingHook: stopping early at epoch {} (no improvement since epoch {})",
                    metrics.epoch, self.best_epoch
                );
                self.stopped_epoch = Some(metrics.epoch);
                return Ok(HookAction::Stop);
            }
        }

        Ok(HookAction::Continue)
    }
}

/// A collection of hooks that are run together.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookList {
    /// Creates a new empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook to the list.
    pub fn add<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Returns the number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs `before_epoch` on every hook.
    pub fn before_epoch(&mut self, epoch: usize) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.before_epoch(epoch)?;
        }
        Ok(())
    }

    /// Runs `after_epoch` on every hook; stops if any hook asks to.
    ///
    /// Every hook sees the epoch even when an earlier one requests a stop.
    pub fn after_epoch(
        &mut self,
        metrics: &Metrics,
        model: &SequentialModel,
    ) -> HookResult<HookAction> {
        let mut action = HookAction::Continue;
        for hook in &mut self.hooks {
            if hook.after_epoch(metrics, model)? == HookAction::Stop {
                debug!("Hook '{}' requested stop", hook.name());
                action = HookAction::Stop;
            }
        }
        Ok(action)
    }

    /// Runs `end` on every hook.
    pub fn end(&mut self, metrics: Option<&Metrics>) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.end(metrics)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use sonar_checkpoint::{JsonCheckpointer, ModelState};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn model() -> SequentialModel {
        let config = ModelConfig::default().with_units(2).with_input(3, 2);
        SequentialModel::build(&config).unwrap()
    }

    fn epoch(epoch: usize, val_loss: f64) -> Metrics {
        Metrics::new(epoch, 1.0, 1.0).with_validation(val_loss, val_loss)
    }

    #[test]
    fn test_logging_line() {
        let hook = LoggingHook::new(10);
        let line = hook.format_line(&epoch(2, 0.39871), 3);
        assert_eq!(
            line,
            "Epoch 2/10 - 3s - loss: 1.0000 - mae: 1.0000 - val_loss: 0.3987 - val_mae: 0.3987"
        );
        let no_val = hook.format_line(&Metrics::new(1, 0.5, 0.25), 0);
        assert_eq!(no_val, "Epoch 1/10 - 0s - loss: 0.5000 - mae: 0.2500");
    }

    #[test]
    fn test_early_stopping_patience() {
        let model = model();
        let mut hook = EarlyStoppingHook::new("val_loss", 3);

        assert_eq!(hook.after_epoch(&epoch(1, 1.0), &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(2, 0.8), &model).unwrap(), HookAction::Continue);
        // equal is not an improvement
        assert_eq!(hook.after_epoch(&epoch(3, 0.8), &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(4, 0.9), &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(5, 0.85), &model).unwrap(), HookAction::Stop);
        assert_eq!(hook.best_value(), Some(0.8));
        assert_eq!(hook.stopped_epoch(), Some(5));
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let model = model();
        let mut hook = EarlyStoppingHook::new("val_loss", 2).with_min_delta(0.1);

        hook.after_epoch(&epoch(1, 1.0), &model).unwrap();
        // improves by less than min_delta
        assert_eq!(hook.after_epoch(&epoch(2, 0.95), &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(3, 0.5), &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(4, 0.5), &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(5, 0.5), &model).unwrap(), HookAction::Stop);
    }

    #[test]
    fn test_missing_metric_is_ignored() {
        let model = model();
        let mut hook = EarlyStoppingHook::new("val_loss", 1);
        let metrics = Metrics::new(1, 0.5, 0.5);
        assert_eq!(hook.after_epoch(&metrics, &model).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&metrics, &model).unwrap(), HookAction::Continue);
    }

    #[test]
    fn test_checkpoint_saves_only_on_improvement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts").join("model.keras");
        let model = model();
        let mut hook = ModelCheckpointHook::new(&path);

        hook.after_epoch(&epoch(1, 0.5), &model).unwrap();
        assert_eq!(hook.saved(), 1);
        hook.after_epoch(&epoch(2, 0.7), &model).unwrap();
        hook.after_epoch(&epoch(3, 0.5), &model).unwrap();
        assert_eq!(hook.saved(), 1);
        hook.after_epoch(&epoch(4, 0.2), &model).unwrap();
        assert_eq!(hook.saved(), 2);
        assert_eq!(hook.best_value(), Some(0.2));

        let state: ModelState = JsonCheckpointer::new().restore(&path).unwrap();
        assert_eq!(state.epoch, 4);
        assert_eq!(state.metadata.get("monitor").map(String::as_str), Some("val_loss"));
        assert_eq!(state.metadata.get("val_loss").map(String::as_str), Some("0.2"));
    }

    #[test]
    fn test_checkpoint_skips_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.keras");
        let model = model();
        let mut hook = ModelCheckpointHook::new(&path);

        hook.after_epoch(&epoch(1, f64::NAN), &model).unwrap();
        assert_eq!(hook.saved(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_checkpoint_save_every_epoch() {
        let dir = tempdir().unwrap();
        let model = model();
        let mut hook =
            ModelCheckpointHook::new(dir.path().join("model.keras")).with_save_best_only(false);
        hook.after_epoch(&epoch(1, 0.5), &model).unwrap();
        hook.after_epoch(&epoch(2, 0.9), &model).unwrap();
        assert_eq!(hook.saved(), 2);
    }

    /// Records saved states instead of writing files.
    #[derive(Clone, Default)]
    struct RecordingCheckpointer {
        saves: Arc<Mutex<Vec<(PathBuf, ModelState)>>>,
    }

    impl Checkpointer for RecordingCheckpointer {
        fn save(&self, path: &Path, state: &ModelState) -> sonar_checkpoint::Result<()> {
            self.saves
                .lock()
                .unwrap()
                .push((path.to_path_buf(), state.clone()));
            Ok(())
        }

        fn restore(&self, path: &Path) -> sonar_checkpoint::Result<ModelState> {
            Err(CheckpointError::NotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn test_checkpoint_custom_monitor_and_writer() {
        let recorder = RecordingCheckpointer::default();
        let model = model();
        let mut hook = ModelCheckpointHook::new("train.keras")
            .with_monitor("loss")
            .with_checkpointer(Box::new(recorder.clone()));

        for (epoch, loss) in [(1, 0.9), (2, 0.8), (3, 0.85)] {
            let metrics = Metrics::new(epoch, loss, loss).with_validation(5.0, 5.0);
            hook.after_epoch(&metrics, &model).unwrap();
        }
        assert_eq!(hook.saved(), 2);
        assert_eq!(hook.best_value(), Some(0.8));

        let saves = recorder.saves.lock().unwrap();
        let epochs: Vec<usize> = saves.iter().map(|(_, state)| state.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
        assert!(saves.iter().all(|(path, _)| path == Path::new("train.keras")));
        assert_eq!(
            saves[1].1.metadata.get("monitor").map(String::as_str),
            Some("loss")
        );
    }

    struct StopAt(usize);

    impl Hook for StopAt {
        fn name(&self) -> &str {
            "stop_at"
        }

        fn after_epoch(
            &mut self,
            metrics: &Metrics,
            _model: &SequentialModel,
        ) -> HookResult<HookAction> {
            if metrics.epoch >= self.0 {
                Ok(HookAction::Stop)
            } else {
                Ok(HookAction::Continue)
            }
        }
    }

    struct Failing;

    impl Hook for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn end(&mut self, _metrics: Option<&Metrics>) -> HookResult<()> {
            Err(HookError::Custom("boom".to_string()))
        }
    }

    #[test]
    fn test_hook_list() {
        let model = model();
        let mut hooks = HookList::new();
        assert!(hooks.is_empty());
        hooks.add(LoggingHook::new(3));
        hooks.add(StopAt(2));
        assert_eq!(hooks.len(), 2);

        hooks.before_epoch(1).unwrap();
        assert_eq!(hooks.after_epoch(&epoch(1, 1.0), &model).unwrap(), HookAction::Continue);
        assert_eq!(hooks.after_epoch(&epoch(2, 1.0), &model).unwrap(), HookAction::Stop);
        hooks.end(None).unwrap();

        hooks.add(Failing);
        assert!(matches!(hooks.end(None), Err(HookError::Custom(_))));
    }
}
