//! Dataset loading and preparation for sonar.
//!
//! This crate turns a comma-delimited sensor log into windowed training data:
//!
//! 1. [`SampleTable`] parses the file and separates the target column from the
//!    feature matrix.
//! 2. [`PartitionSizes`] splits the rows 50/25/25 by position.
//! 3. [`NormalizationStats`] standardizes every column using train statistics.
//! 4. [`TimeseriesDataset`] yields sliding-window batches for one partition.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sonar_data::{
//!     NormalizationStats, PartitionSizes, SampleTable, TargetSelection, TimeseriesDataset,
//!     WindowConfig,
//! };
//!
//! let mut text = String::from("time,pressure,temperature,humidity\n");
//! for i in 0..64 {
//!     text.push_str(&format!("t{},{},{},{}\n", i, 1000 + i % 7, i % 5, 50 + i % 3));
//! }
//!
//! let table = SampleTable::parse(&text).unwrap();
//! let (mut features, targets) = table.split_target(&TargetSelection::default()).unwrap();
//! let sizes = PartitionSizes::new(features.num_rows());
//! NormalizationStats::fit(&features, sizes.num_train)
//!     .unwrap()
//!     .apply(&mut features)
//!     .unwrap();
//!
//! let config = WindowConfig::default()
//!     .with_sampling_rate(1)
//!     .with_sequence_length(4)
//!     .with_horizon(1)
//!     .with_batch_size(8);
//! let mut train = TimeseriesDataset::new(
//!     Arc::new(features),
//!     targets.into(),
//!     config,
//!     0,
//!     Some(sizes.num_train),
//! )
//! .unwrap();
//!
//! for batch in train.epoch() {
//!     assert_eq!(batch.input_shape()[1..], [4, 2]);
//! }
//! ```

pub mod error;
pub mod normalize;
pub mod split;
pub mod table;
pub mod window;

pub use error::{DataError, Result};
pub use normalize::NormalizationStats;
pub use split::PartitionSizes;
pub use table::{FeatureMatrix, SampleTable, TargetSelection};
pub use window::{TimeseriesDataset, WindowBatch, WindowBatches, WindowConfig};
