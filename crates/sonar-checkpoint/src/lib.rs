//! Checkpoint save/restore for sonar models.
//!
//! # Core Components
//!
//! - [`Checkpointer`]: Trait for checkpoint serialization implementations
//! - [`JsonCheckpointer`]: Writes a [`ModelState`] as a single JSON document
//! - [`ModelState`]: Layer specs, input shape and named parameter tensors
//!
//! # Example
//!
//! ```no_run
//! use sonar_checkpoint::{Checkpointer, JsonCheckpointer, ModelState};
//! use std::path::Path;
//!
//! fn main() -> sonar_checkpoint::Result<()> {
//!     let state = ModelState::new(1, vec![120, 13], Vec::new());
//!     let checkpointer = JsonCheckpointer::new();
//!     checkpointer.save(Path::new("scripts/model.keras"), &state)?;
//!     let restored = checkpointer.restore(Path::new("scripts/model.keras"))?;
//!     Ok(())
//! }
//! ```

pub mod checkpointer;
pub mod state;

pub use checkpointer::{Checkpointer, JsonCheckpointer};
pub use state::{ModelState, TensorState, CHECKPOINT_VERSION};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// I/O error during checkpoint operations.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file not found.
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    /// Error during serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Error during deserialization.
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Checkpoint version mismatch.
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version.
        expected: u32,
        /// Found version.
        found: u32,
    },

    /// Corrupted checkpoint data.
    #[error("Corrupted checkpoint: {0}")]
    Corrupted(String),
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
