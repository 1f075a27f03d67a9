use std::fs;
use std::path::{Path, PathBuf};

use sonar_checkpoint::{Checkpointer, JsonCheckpointer, ModelState};
use sonar_data::{DataError, WindowConfig};
use sonar_training::{run_pipeline, LayerKind, PipelineConfig, TrainingError};
use tempfile::{tempdir, TempDir};

const ROWS: usize = 1000;

/// Identifier column plus five slowly varying numeric columns.
fn write_dataset(dir: &Path) -> PathBuf {
    let mut text = String::from("Date Time,p (mbar),T (degC),rh (%),wv (m/s),wd (deg)\n");
    for i in 0..ROWS {
        let t = i as f64 / 24.0;
        let jitter = ((i * 7919) % 101) as f64 / 1000.0;
        text.push_str(&format!(
            "r{:04},{:.3},{:.3},{:.3},{:.3},{:.3}\n",
            i,
            990.0 + 5.0 * (t * 0.3).sin() + jitter,
            10.0 * (t * 0.5).sin() + 2.0 * (t * 0.1).cos() + jitter,
            70.0 + 20.0 * (t * 0.5 + 1.0).cos(),
            2.0 + (t * 0.9).sin().abs() + jitter,
            180.0 + 90.0 * (t * 0.2).sin(),
        ));
    }
    let path = dir.join("sensors.csv");
    fs::write(&path, text).unwrap();
    path
}

fn compact_window() -> WindowConfig {
    WindowConfig::default()
        .with_sampling_rate(1)
        .with_sequence_length(8)
        .with_horizon(2)
}

fn config(dir: &TempDir, output_model: &str, layer: &str, units: usize) -> PipelineConfig {
    let dataset = write_dataset(dir.path());
    PipelineConfig::new(dataset, output_model)
        .with_output_dir(dir.path().join("scripts"))
        .with_layer(LayerKind::parse(layer))
        .with_units(units)
        .with_epochs(1)
        .with_batch_size(64)
        .with_early_stopping(false)
        .with_dropout(0.2)
        .with_window(compact_window())
}

fn restore(path: &Path) -> ModelState {
    JsonCheckpointer::new().restore(path).unwrap()
}

#[test]
fn test_lstm_run_writes_checkpoint_and_reports_mae() {
    let dir = tempdir().unwrap();
    let config = config(&dir, "sonar", "LSTM", 32);

    let report = run_pipeline(&config).unwrap();

    assert_eq!(report.checkpoint_path, dir.path().join("scripts").join("sonar.keras"));
    assert!(report.checkpoint_path.exists());
    assert_eq!(report.history.len(), 1);
    assert!(report.test_mae().is_finite());
    assert!(report.test.num_windows > 0);

    let line = report.summary_line();
    let value = line.strip_prefix("Test MAE: ").unwrap();
    let (_, decimals) = value.split_once('.').unwrap();
    assert_eq!(decimals.len(), 4);

    let state = restore(&report.checkpoint_path);
    assert_eq!(state.input_shape, vec![8, 4]);
    assert_eq!(state.epoch, 1);
    assert_eq!(state.layers.len(), 4);
}

#[test]
fn test_gru_produces_identical_architecture() {
    let dir = tempdir().unwrap();
    let lstm = run_pipeline(&config(&dir, "lstm_run", "LSTM", 8)).unwrap();
    let gru = run_pipeline(&config(&dir, "gru_run", "GRU", 8)).unwrap();

    let lstm_layers = serde_json::to_string(&restore(&lstm.checkpoint_path).layers).unwrap();
    let gru_layers = serde_json::to_string(&restore(&gru.checkpoint_path).layers).unwrap();
    assert_eq!(lstm_layers, gru_layers);
}

#[test]
fn test_unknown_layer_skips_recurrence() {
    let dir = tempdir().unwrap();
    let report = run_pipeline(&config(&dir, "plain", "Transformer", 8)).unwrap();

    let state = restore(&report.checkpoint_path);
    let kinds: Vec<&str> = state.layers.iter().map(|l| l.kind()).collect();
    assert_eq!(kinds, vec!["Dropout", "Dense"]);
    assert!(report.test_mae().is_finite());
}

#[test]
fn test_checkpoint_holds_best_epoch() {
    let dir = tempdir().unwrap();
    let config = config(&dir, "best", "LSTM", 4)
        .with_epochs(6)
        .with_early_stopping(true);

    let report = run_pipeline(&config).unwrap();
    let best = report.history.best_epoch().unwrap();
    let epochs = report.history.len();
    assert!(epochs <= 6);
    // patience 3: training never runs more than three epochs past the best
    assert!(epochs <= best.epoch + 3);
    assert_eq!(report.history.stopped_early, epochs < 6);

    let state = restore(&report.checkpoint_path);
    assert_eq!(state.epoch, best.epoch);
    assert_eq!(state.metadata.get("monitor").map(String::as_str), Some("val_loss"));
}

#[test]
fn test_default_geometry_needs_more_rows() {
    let dir = tempdir().unwrap();
    let config = config(&dir, "too_short", "LSTM", 4).with_window(WindowConfig::default());

    match run_pipeline(&config) {
        Err(TrainingError::EmptyPartition {
            partition,
            rows,
            delay,
            ..
        }) => {
            assert_eq!(partition, "train");
            assert_eq!(rows, ROWS / 2);
            assert_eq!(delay, 858);
        }
        other => panic!("expected EmptyPartition, got {:?}", other),
    }
    assert!(!config.checkpoint_path().exists());
}

#[test]
fn test_missing_dataset() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig::new(dir.path().join("absent.csv"), "m")
        .with_output_dir(dir.path())
        .with_window(compact_window());
    assert!(matches!(
        run_pipeline(&config),
        Err(TrainingError::Data(DataError::Io { .. }))
    ));
}
