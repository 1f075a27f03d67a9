//! Error types for dataset loading and preparation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, normalizing or windowing a dataset.
#[derive(Error, Debug)]
pub enum DataError {
    /// The dataset file could not be read.
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file has no header or no data rows.
    #[error("Dataset contains no data rows")]
    EmptyDataset,

    /// A row has a different number of fields than the header.
    #[error("Line {line}: expected {expected} fields, found {actual}")]
    ColumnCount {
        /// 1-based line number in the file.
        line: usize,
        /// Number of header fields.
        expected: usize,
        /// Number of fields on the line.
        actual: usize,
    },

    /// A numeric field could not be parsed.
    #[error("Line {line}: column '{column}' has non-numeric value '{value}'")]
    InvalidNumber {
        /// 1-based line number in the file.
        line: usize,
        /// Header name of the column.
        column: String,
        /// The raw field text.
        value: String,
    },

    /// The requested target column does not exist among the numeric fields.
    #[error("Target column index {index} out of range ({available} numeric columns)")]
    TargetColumnOutOfRange {
        /// Requested index among the numeric fields.
        index: usize,
        /// Number of numeric fields available.
        available: usize,
    },

    /// Removing the target left no feature columns.
    #[error("No feature columns remain after extracting the target")]
    NoFeatures,

    /// A feature column is constant over the train partition.
    #[error("Column '{column}' has zero variance over the first {rows} rows; cannot normalize")]
    ZeroVariance {
        /// Name of the constant column.
        column: String,
        /// Number of rows the statistics were computed over.
        rows: usize,
    },

    /// Statistics and matrix disagree on the number of columns.
    #[error("Column count mismatch: statistics have {expected} columns, matrix has {actual}")]
    ShapeMismatch {
        /// Columns the statistics were fitted on.
        expected: usize,
        /// Columns in the matrix.
        actual: usize,
    },

    /// Invalid window or partition configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for data operations.
pub type Result<T> = std::result::Result<T, DataError>;
