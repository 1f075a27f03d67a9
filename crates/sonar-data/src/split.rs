//! Positional train/validation/test partitioning.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Sizes of the three contiguous partitions of a timeseries.
///
/// Train takes the first half, validation the next quarter and test the rest,
/// so the three always add up to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSizes {
    /// Rows in the train partition.
    pub num_train: usize,
    /// Rows in the validation partition.
    pub num_val: usize,
    /// Rows in the test partition.
    pub num_test: usize,
}

impl PartitionSizes {
    /// Splits `total` rows 50/25/25 by position.
    pub fn new(total: usize) -> Self {
        let num_train = total / 2;
        let num_val = total / 4;
        Self {
            num_train,
            num_val,
            num_test: total - num_train - num_val,
        }
    }

    /// Total number of rows.
    pub fn total(&self) -> usize {
        self.num_train + self.num_val + self.num_test
    }

    /// Row range of the train partition.
    pub fn train_range(&self) -> Range<usize> {
        0..self.num_train
    }

    /// Row range of the validation partition.
    pub fn val_range(&self) -> Range<usize> {
        self.num_train..self.num_train + self.num_val
    }

    /// Row range of the test partition.
    pub fn test_range(&self) -> Range<usize> {
        self.num_train + self.num_val..self.total()
    }
}
