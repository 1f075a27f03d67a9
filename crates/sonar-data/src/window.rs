//! Sliding-window timeseries datasets.
//!
//! A window starting at row `s` holds `sequence_length` feature rows sampled
//! every `sampling_rate` rows, and is labelled with the target `delay` rows
//! after its start:
//!
//! ```text
//! inputs = features[s], features[s + sr], ..., features[s + (L - 1) * sr]
//! target = target[s + delay]      delay = sr * (L + horizon - 1)
//! ```
//!
//! Window starts are confined to `[start_index, end_index)` and the last
//! sampled row of a window never reaches `end_index`. `end_index` is clipped
//! to `rows - delay` so every window has a target.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::table::FeatureMatrix;

/// Window geometry and batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Take every `sampling_rate`th row inside a window.
    pub sampling_rate: usize,
    /// Rows per window after sampling.
    pub sequence_length: usize,
    /// Forecast horizon, in sampled steps past the window.
    pub horizon: usize,
    /// Windows per batch.
    pub batch_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 6,
            sequence_length: 120,
            horizon: 24,
            batch_size: 256,
        }
    }
}

impl WindowConfig {
    /// Sets the sampling rate.
    pub fn with_sampling_rate(mut self, sampling_rate: usize) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    /// Sets the number of sampled rows per window.
    pub fn with_sequence_length(mut self, sequence_length: usize) -> Self {
        self.sequence_length = sequence_length;
        self
    }

    /// Sets the forecast horizon.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Sets the number of windows per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Rows between a window's start and its target.
    ///
    /// Saturates at `usize::MAX` for configs that [`validate`](Self::validate)
    /// rejects.
    pub fn delay(&self) -> usize {
        self.checked_delay().unwrap_or(usize::MAX)
    }

    /// Raw rows covered by one window, first to last sampled row inclusive.
    ///
    /// Saturates at `usize::MAX` for configs that [`validate`](Self::validate)
    /// rejects.
    pub fn span(&self) -> usize {
        self.checked_span().unwrap_or(usize::MAX)
    }

    fn checked_delay(&self) -> Option<usize> {
        self.sequence_length
            .checked_add(self.horizon)?
            .checked_sub(1)?
            .checked_mul(self.sampling_rate)
    }

    fn checked_span(&self) -> Option<usize> {
        self.sequence_length
            .checked_sub(1)?
            .checked_mul(self.sampling_rate)?
            .checked_add(1)
    }

    /// Smallest partition length (in rows) that yields at least one window
    /// when the partition is not clipped by the delay.
    pub fn min_partition_rows(&self) -> usize {
        self.span()
    }

    /// Checks that every field is positive and the window geometry fits in
    /// `usize`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] naming the first zero field, or
    /// when the delay or span overflows.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("sampling_rate", self.sampling_rate),
            ("sequence_length", self.sequence_length),
            ("horizon", self.horizon),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(DataError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.checked_delay().is_none() || self.checked_span().is_none() {
            return Err(DataError::InvalidConfig(format!(
                "window geometry overflows: sampling_rate {} * (sequence_length {} + horizon {} - 1)",
                self.sampling_rate, self.sequence_length, self.horizon
            )));
        }
        Ok(())
    }
}

/// A batch of windows laid out as `[batch, sequence_length, num_features]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    /// Row-major window data.
    pub inputs: Vec<f32>,
    /// One target per window.
    pub targets: Vec<f32>,
    /// Start row of every window.
    pub starts: Vec<usize>,
    /// Rows per window.
    pub sequence_length: usize,
    /// Features per row.
    pub num_features: usize,
}

impl WindowBatch {
    /// Number of windows in the batch.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the batch holds no windows.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// `[batch, sequence_length, num_features]`.
    pub fn input_shape(&self) -> [usize; 3] {
        [self.len(), self.sequence_length, self.num_features]
    }

    /// Splits the batch into consecutive sub-batches of at most `size` windows.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = WindowBatch> + '_ {
        let size = size.max(1);
        let per_window = self.sequence_length * self.num_features;
        (0..self.len()).step_by(size).map(move |lo| {
            let hi = (lo + size).min(self.len());
            WindowBatch {
                inputs: self.inputs[lo * per_window..hi * per_window].to_vec(),
                targets: self.targets[lo..hi].to_vec(),
                starts: self.starts[lo..hi].to_vec(),
                sequence_length: self.sequence_length,
                num_features: self.num_features,
            }
        })
    }
}

/// Restartable sliding-window dataset over one partition of a timeseries.
#[derive(Debug, Clone)]
pub struct TimeseriesDataset {
    features: Arc<FeatureMatrix>,
    targets: Arc<[f32]>,
    config: WindowConfig,
    start_index: usize,
    num_windows: usize,
    shuffle: bool,
    rng: StdRng,
}

impl TimeseriesDataset {
    /// Creates a dataset whose windows start in `[start_index, end_index)`.
    ///
    /// `end_index = None` means "up to the last row that still has a target".
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] for an invalid window config or if
    /// features and targets differ in length.
    pub fn new(
        features: Arc<FeatureMatrix>,
        targets: Arc<[f32]>,
        config: WindowConfig,
        start_index: usize,
        end_index: Option<usize>,
    ) -> Result<Self> {
        config.validate()?;
        if features.num_rows() != targets.len() {
            return Err(DataError::InvalidConfig(format!(
                "{} feature rows but {} targets",
                features.num_rows(),
                targets.len()
            )));
        }

        let usable = features.num_rows().saturating_sub(config.delay());
        let end = end_index.map_or(usable, |end| end.min(usable));
        let num_windows = end
            .saturating_sub(start_index)
            .saturating_sub(config.span() - 1);

        Ok(Self {
            features,
            targets,
            config,
            start_index,
            num_windows,
            shuffle: false,
            rng: StdRng::seed_from_u64(0),
        })
    }

    /// Reshuffles window order on every pass, seeded by `seed`.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Window geometry.
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Number of windows per pass.
    pub fn len(&self) -> usize {
        self.num_windows
    }

    /// Whether the dataset yields no windows.
    pub fn is_empty(&self) -> bool {
        self.num_windows == 0
    }

    /// Number of batches per pass.
    pub fn num_batches(&self) -> usize {
        self.num_windows.div_ceil(self.config.batch_size)
    }

    /// Features per row.
    pub fn num_features(&self) -> usize {
        self.features.num_cols()
    }

    /// Window start rows in order.
    pub fn window_starts(&self) -> Vec<usize> {
        (self.start_index..self.start_index + self.num_windows).collect()
    }

    /// Starts a fresh pass over the windows.
    pub fn epoch(&mut self) -> WindowBatches {
        let mut order = self.window_starts();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        WindowBatches {
            features: Arc::clone(&self.features),
            targets: Arc::clone(&self.targets),
            config: self.config,
            order,
            position: 0,
        }
    }
}

/// Iterator over the batches of one pass.
#[derive(Debug)]
pub struct WindowBatches {
    features: Arc<FeatureMatrix>,
    targets: Arc<[f32]>,
    config: WindowConfig,
    order: Vec<usize>,
    position: usize,
}

impl Iterator for WindowBatches {
    type Item = WindowBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.config.batch_size).min(self.order.len());
        let starts = self.order[self.position..end].to_vec();
        self.position = end;

        let cols = self.features.num_cols();
        let seq = self.config.sequence_length;
        let delay = self.config.delay();

        let mut inputs = Vec::with_capacity(starts.len() * seq * cols);
        let mut targets = Vec::with_capacity(starts.len());
        for &s in &starts {
            for j in 0..seq {
                inputs.extend_from_slice(self.features.row(s + j * self.config.sampling_rate));
            }
            targets.push(self.targets[s + delay]);
        }

        Some(WindowBatch {
            inputs,
            targets,
            starts,
            sequence_length: seq,
            num_features: cols,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.config.batch_size);
        (remaining, Some(remaining))
    }
}
