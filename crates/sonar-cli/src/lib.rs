//! Command-line front end for sonar.
//!
//! One invocation trains one model:
//!
//! ```bash
//! acoustic-model data/sensors.csv sonar LSTM 32 10 64 1 0,2
//! ```
//!
//! The eight positional arguments are the dataset, the checkpoint name, the
//! layer type, LSTM units, epochs, batch size, the early-stopping toggle and
//! the dropout rate. Optional flags expose the window geometry, the target
//! column, the output directory and the seed.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sonar_data::{TargetSelection, WindowConfig};
use sonar_training::{run_pipeline, LayerKind, PipelineConfig, PipelineReport};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log directives used when `RUST_LOG` is unset or empty.
pub const DEFAULT_LOG_DIRECTIVES: &[&str] = &[
    "sonar_cli=info",
    "sonar_data=info",
    "sonar_checkpoint=info",
    "sonar_training=info",
];

/// Builds the log filter from `RUST_LOG`-style directives.
///
/// `None`, blank or unparsable directives fall back to
/// [`DEFAULT_LOG_DIRECTIVES`].
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES.join(",")))
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;

/// Train a recurrent regression model on an acoustic sensor log
///
/// Loads the CSV, standardizes it with train statistics, fits on sliding
/// windows while keeping the best checkpoint by validation loss, then reloads
/// that checkpoint and prints its test MAE.
#[derive(Parser, Debug, Clone)]
#[command(name = "acoustic-model")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// CSV dataset with a header row; the first column is an identifier
    pub dataset: PathBuf,

    /// Checkpoint name, written to <OUTPUT_DIR>/<OUTPUT_MODEL>.keras
    pub output_model: String,

    /// Layer type: LSTM or GRU; any other value skips the recurrent layers
    #[arg(value_parser = parse_layer)]
    pub layer: LayerKind,

    /// Units of each LSTM layer
    #[arg(value_parser = parse_positive)]
    pub units: usize,

    /// Maximum number of epochs
    #[arg(value_parser = parse_positive)]
    pub epochs: usize,

    /// Windows per optimizer step
    #[arg(value_parser = parse_positive)]
    pub batch_size: usize,

    /// Non-zero stops training after 3 epochs without val_loss improvement
    #[arg(allow_negative_numbers = true)]
    pub early_stopping: i64,

    /// Dropout rate in [0, 1); a decimal comma is accepted
    #[arg(allow_negative_numbers = true, value_parser = parse_dropout)]
    pub dropout: f32,

    /// Directory receiving the checkpoint
    #[arg(long, env = "SONAR_OUTPUT_DIR", default_value = "scripts")]
    pub output_dir: PathBuf,

    /// Target column, counted among the numeric columns
    #[arg(long, default_value_t = 1)]
    pub target_column: usize,

    /// Keep the target column among the input features
    #[arg(long)]
    pub include_target: bool,

    /// Use every Nth row inside a window
    #[arg(long, default_value_t = 6, value_parser = parse_positive)]
    pub sampling_rate: usize,

    /// Sampled rows per window
    #[arg(long, default_value_t = 120, value_parser = parse_positive)]
    pub sequence_length: usize,

    /// Forecast horizon in sampled steps
    #[arg(long, default_value_t = 24, value_parser = parse_positive)]
    pub horizon: usize,

    /// Windows per dataset batch
    #[arg(long, default_value_t = 256, value_parser = parse_positive)]
    pub window_batch_size: usize,

    /// Seed for initialization, dropout and shuffling
    #[arg(long, default_value_t = 1337)]
    pub seed: u64,
}

impl Cli {
    /// Whether early stopping was requested.
    pub fn early_stopping_enabled(&self) -> bool {
        self.early_stopping != 0
    }

    /// Window geometry from the flags.
    pub fn window(&self) -> WindowConfig {
        WindowConfig::default()
            .with_sampling_rate(self.sampling_rate)
            .with_sequence_length(self.sequence_length)
            .with_horizon(self.horizon)
            .with_batch_size(self.window_batch_size)
    }

    /// Resolves the arguments into a pipeline configuration.
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.dataset.clone(), self.output_model.clone())
            .with_output_dir(self.output_dir.clone())
            .with_layer(self.layer.clone())
            .with_units(self.units)
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_early_stopping(self.early_stopping_enabled())
            .with_dropout(self.dropout)
            .with_target(
                TargetSelection::new(self.target_column)
                    .with_include_in_features(self.include_target),
            )
            .with_window(self.window())
            .with_seed(self.seed)
    }
}

fn parse_layer(value: &str) -> Result<LayerKind, String> {
    Ok(LayerKind::parse(value))
}

fn parse_positive(value: &str) -> Result<usize, String> {
    let parsed: usize = value
        .trim()
        .parse()
        .map_err(|_| format!("`{}` is not a positive integer", value))?;
    if parsed == 0 {
        return Err("must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_dropout(value: &str) -> Result<f32, String> {
    let rate: f32 = value
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if !(0.0..1.0).contains(&rate) {
        return Err(format!("must be in [0, 1), got {}", rate));
    }
    Ok(rate)
}

/// Runs one training session.
///
/// # Errors
///
/// Returns the pipeline failure with the dataset path as context.
pub fn run(cli: &Cli) -> CliResult<PipelineReport> {
    let config = cli.to_config();
    info!(
        dataset = %config.dataset.display(),
        checkpoint = %config.checkpoint_path().display(),
        "Starting acoustic model training"
    );
    let report = run_pipeline(&config)
        .with_context(|| format!("Training on {} failed", config.dataset.display()))?;
    Ok(report)
}
