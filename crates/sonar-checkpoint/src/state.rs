//! Model state representation for checkpointing.
//!
//! A [`ModelState`] holds everything needed to rebuild a trained model: the
//! ordered layer specs, the input shape and every named parameter tensor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sonar_layers::{LayerSpec, Tensor};

use crate::{CheckpointError, Result};

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A flattened parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorState {
    /// Tensor shape.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f32>,
}

impl TensorState {
    /// Converts back into a [`Tensor`].
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Corrupted`] if the value count does not
    /// match the shape.
    pub fn to_tensor(&self) -> Result<Tensor> {
        let expected: usize = self.shape.iter().product();
        if expected != self.values.len() {
            return Err(CheckpointError::Corrupted(format!(
                "tensor of shape {:?} has {} values",
                self.shape,
                self.values.len()
            )));
        }
        Ok(Tensor::from_data(&self.shape, self.values.clone()))
    }
}

impl From<&Tensor> for TensorState {
    fn from(tensor: &Tensor) -> Self {
        Self {
            shape: tensor.shape().to_vec(),
            values: tensor.data().to_vec(),
        }
    }
}

/// Complete model state for checkpointing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    /// Version of the checkpoint format.
    pub version: u32,

    /// Epoch (1-based) whose weights are stored.
    pub epoch: usize,

    /// Timestamp when the checkpoint was created (Unix epoch seconds).
    pub timestamp: u64,

    /// Per-sample input shape, `[sequence_length, num_features]`.
    pub input_shape: Vec<usize>,

    /// Layer specs in forward order.
    pub layers: Vec<LayerSpec>,

    /// Parameters keyed by name, e.g. `lstm_1/recurrent_kernel`.
    pub params: BTreeMap<String, TensorState>,

    /// Additional metadata (monitored metric, its value, ...).
    pub metadata: BTreeMap<String, String>,
}

impl ModelState {
    /// Create a model state without parameters.
    ///
    /// # Arguments
    ///
    /// * `epoch` - Epoch whose weights will be stored
    /// * `input_shape` - Per-sample input shape
    /// * `layers` - Layer specs in forward order
    pub fn new(epoch: usize, input_shape: Vec<usize>, layers: Vec<LayerSpec>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            epoch,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            input_shape,
            layers,
            params: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a named parameter.
    pub fn add_param(&mut self, name: impl Into<String>, tensor: &Tensor) {
        self.params.insert(name.into(), TensorState::from(tensor));
    }

    /// Look up a parameter as a tensor.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Corrupted`] if the parameter is missing or
    /// malformed.
    pub fn param(&self, name: &str) -> Result<Tensor> {
        self.params
            .get(name)
            .ok_or_else(|| CheckpointError::Corrupted(format!("missing parameter '{}'", name)))?
            .to_tensor()
    }

    /// Add a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Total number of stored scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.params.values().map(|p| p.values.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_spec() -> LayerSpec {
        LayerSpec::Dense {
            name: "dense".to_string(),
            input_dim: 2,
            units: 1,
        }
    }

    #[test]
    fn test_model_state_params() {
        let mut state = ModelState::new(3, vec![8, 2], vec![dense_spec()]);
        assert_eq!(state.version, CHECKPOINT_VERSION);

        let kernel = Tensor::from_data(&[2, 1], vec![0.5, -0.5]);
        state.add_param("dense/kernel", &kernel);
        state.set_metadata("monitor", "val_loss");

        assert_eq!(state.param("dense/kernel").unwrap(), kernel);
        assert_eq!(state.num_parameters(), 2);
        assert!(state.param("dense/bias").is_err());
        assert_eq!(state.metadata["monitor"], "val_loss");
    }

    #[test]
    fn test_malformed_tensor_is_corrupted() {
        let bad = TensorState {
            shape: vec![2, 2],
            values: vec![1.0],
        };
        assert!(matches!(
            bad.to_tensor(),
            Err(CheckpointError::Corrupted(_))
        ));
    }

    #[test]
    fn test_state_serialization() {
        let mut state = ModelState::new(1, vec![4, 2], vec![dense_spec()]);
        state.add_param("dense/bias", &Tensor::from_data(&[1], vec![0.25]));

        let json = serde_json::to_string(&state).unwrap();
        let restored: ModelState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
