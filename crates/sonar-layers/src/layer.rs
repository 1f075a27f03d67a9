//! Layer trait definition for neural network layers.
//!
//! This module defines the core [`Layer`] trait that all neural network layers
//! must implement, providing a unified interface for forward and backward passes.

use crate::error::{LayerError, LayerResult};
use crate::spec::LayerSpec;
use crate::tensor::Tensor;

/// A neural network layer that supports forward and backward propagation.
///
/// Each layer must be able to:
/// - Perform an inference forward pass without mutating itself
/// - Perform a training forward pass that caches what backward needs
/// - Perform a backward pass that stores parameter gradients
/// - Expose its learnable parameters by name
///
/// # Example
///
/// ```
/// use sonar_layers::dense::Dense;
/// use sonar_layers::layer::Layer;
/// use sonar_layers::tensor::Tensor;
///
/// let layer = Dense::new("dense", 128, 64);
/// let input = Tensor::zeros(&[32, 128]); // batch of 32, input dim 128
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[32, 64]);
/// ```
pub trait Layer: Send + Sync {
    /// Performs an inference forward pass through the layer.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the input shape is incompatible with the layer
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor>;

    /// Performs a training forward pass, caching intermediate values for
    /// [`Layer::backward`].
    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor>;

    /// Performs a backward pass through the layer.
    ///
    /// Takes the gradient of the loss with respect to the layer's output,
    /// stores the gradients of the layer's parameters and returns the
    /// gradient with respect to the layer's input.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotInitialized`] if no training forward pass was
    /// cached, or a shape error if the gradient is incompatible
    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor>;

    /// Returns references to the layer's learnable parameters.
    fn parameters(&self) -> Vec<&Tensor>;

    /// Returns mutable references to the layer's learnable parameters.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Returns the gradients from the last backward pass, in the same order
    /// as [`Layer::parameters`].
    fn gradients(&self) -> Vec<&Tensor>;

    /// Returns fully qualified parameter names, e.g. `lstm_1/kernel`, in the
    /// same order as [`Layer::parameters`].
    fn parameter_names(&self) -> Vec<String>;

    /// Returns the name of the layer.
    fn name(&self) -> &str;

    /// Returns the structural configuration needed to rebuild this layer.
    fn spec(&self) -> LayerSpec;

    /// Output shape for a given input shape.
    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize>;

    /// Returns whether the layer is in training mode.
    fn is_training(&self) -> bool {
        true
    }

    /// Sets the layer's training mode.
    fn set_training(&mut self, _training: bool) {
        // Default implementation does nothing
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Replaces the parameter called `name` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ParameterError`] for unknown names and
    /// [`LayerError::ShapeMismatch`] if `value` has the wrong shape
    fn load_parameter(&mut self, name: &str, value: &Tensor) -> LayerResult<()> {
        let names = self.parameter_names();
        let idx = names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| LayerError::ParameterError {
                name: name.to_string(),
                message: format!("unknown parameter for layer '{}'", self.name()),
            })?;

        let mut params = self.parameters_mut();
        if params[idx].shape() != value.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: params[idx].shape().to_vec(),
                actual: value.shape().to_vec(),
            });
        }
        *params[idx] = value.clone();
        Ok(())
    }
}

/// Checks that `input` has `ndim` dimensions and a last axis of `last_dim`.
pub(crate) fn check_input(input: &Tensor, ndims: &[usize], last_dim: usize) -> LayerResult<()> {
    if !ndims.contains(&input.ndim()) {
        return Err(LayerError::ForwardError {
            message: format!(
                "expected a tensor with {:?} dimensions, got shape {:?}",
                ndims,
                input.shape()
            ),
        });
    }
    let actual = input.shape()[input.ndim() - 1];
    if actual != last_dim {
        return Err(LayerError::InvalidInputDimension {
            expected: last_dim,
            actual,
        });
    }
    Ok(())
}
