//! Checkpointer trait for save/restore operations.
//!
//! This module defines the core `Checkpointer` trait that all checkpoint
//! implementations must satisfy.

use std::path::Path;

use crate::state::{ModelState, CHECKPOINT_VERSION};
use crate::{CheckpointError, Result};

/// Trait for checkpoint serialization and deserialization.
///
/// Implementors of this trait provide the logic for saving and restoring
/// model state to/from persistent storage.
///
/// # Examples
///
/// ```no_run
/// use sonar_checkpoint::{Checkpointer, ModelState, JsonCheckpointer};
/// use std::path::Path;
///
/// fn main() -> sonar_checkpoint::Result<()> {
///     let checkpointer = JsonCheckpointer::new();
///     let state = ModelState::new(1, vec![120, 13], Vec::new());
///
///     checkpointer.save(Path::new("scripts/model.keras"), &state)?;
///     let restored = checkpointer.restore(Path::new("scripts/model.keras"))?;
///     assert_eq!(restored.epoch, 1);
///     Ok(())
/// }
/// ```
pub trait Checkpointer: Send + Sync {
    /// Save a model state to the given path, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized or written.
    fn save(&self, path: &Path, state: &ModelState) -> Result<()>;

    /// Restore a model state from the given path.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotFound`] if the file does not exist and
    /// [`CheckpointError::VersionMismatch`] for an unsupported format version.
    fn restore(&self, path: &Path) -> Result<ModelState>;
}

/// JSON-based checkpoint implementation.
///
/// The file name is chosen by the caller; the content is always JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonCheckpointer {
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl JsonCheckpointer {
    /// Create a new JSON checkpointer.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Create a new JSON checkpointer with pretty printing.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Checkpointer for JsonCheckpointer {
    fn save(&self, path: &Path, state: &ModelState) -> Result<()> {
        tracing::debug!(path = %path.display(), epoch = state.epoch, "Saving checkpoint");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = if self.pretty {
            serde_json::to_string_pretty(state)
        } else {
            serde_json::to_string(state)
        }
        .map_err(CheckpointError::Serialization)?;

        std::fs::write(path, json).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            path = %path.display(),
            size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            "Checkpoint saved"
        );
        Ok(())
    }

    fn restore(&self, path: &Path) -> Result<ModelState> {
        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }

        let json = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let state: ModelState =
            serde_json::from_str(&json).map_err(CheckpointError::Deserialization)?;

        if state.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: CHECKPOINT_VERSION,
                found: state.version,
            });
        }

        tracing::info!(
            path = %path.display(),
            epoch = state.epoch,
            layers = state.layers.len(),
            params = state.num_parameters(),
            "Checkpoint restored"
        );
        Ok(state)
    }
}
