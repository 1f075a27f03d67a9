//! Dense (fully connected) layer implementation.
//!
//! This module provides the [`Dense`] layer, which performs a linear transformation
//! `y = xW + b` over the last axis of its input.

use rand::Rng;

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{check_input, Layer};
use crate::spec::LayerSpec;
use crate::tensor::Tensor;

/// A dense (fully connected) neural network layer with a linear activation.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[..., in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
/// - `y` is the output tensor of shape `[..., out_features]`
///
/// # Example
///
/// ```
/// use sonar_layers::dense::Dense;
/// use sonar_layers::layer::Layer;
/// use sonar_layers::tensor::Tensor;
///
/// let layer = Dense::new("dense", 32, 1);
/// let input = Tensor::zeros(&[8, 32]);
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[8, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct Dense {
    name: String,
    /// Weight matrix of shape [in_features, out_features]
    kernel: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    kernel_grad: Tensor,
    bias_grad: Tensor,
    /// Cached input for backward pass
    cached_input: Option<Tensor>,
    in_features: usize,
    out_features: usize,
}

impl Dense {
    /// Creates a new dense layer with Glorot-uniform weights and zero bias.
    ///
    /// # Arguments
    ///
    /// * `name` - Layer name used to prefix parameter names
    /// * `in_features` - Size of the last input axis
    /// * `out_features` - Number of output units
    pub fn new(name: impl Into<String>, in_features: usize, out_features: usize) -> Self {
        Self::with_rng(name, in_features, out_features, &mut rand::thread_rng())
    }

    /// Creates a new dense layer drawing its initial weights from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        name: impl Into<String>,
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Self {
        let kernel = Initializer::GlorotUniform.initialize(&[in_features, out_features], rng);
        let bias = Initializer::Zeros.initialize(&[out_features], rng);
        Self {
            name: name.into(),
            kernel,
            bias,
            kernel_grad: Tensor::zeros(&[in_features, out_features]),
            bias_grad: Tensor::zeros(&[out_features]),
            cached_input: None,
            in_features,
            out_features,
        }
    }

    /// Creates a dense layer from existing weights.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ShapeMismatch`] if the bias doesn't match the
    /// kernel's output dimension
    pub fn from_weights(name: impl Into<String>, kernel: Tensor, bias: Tensor) -> LayerResult<Self> {
        if kernel.ndim() != 2 {
            return Err(LayerError::ConfigError {
                message: format!("dense kernel must be 2D, got shape {:?}", kernel.shape()),
            });
        }
        let (in_features, out_features) = (kernel.shape()[0], kernel.shape()[1]);
        if bias.shape() != [out_features] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![out_features],
                actual: bias.shape().to_vec(),
            });
        }
        Ok(Self {
            name: name.into(),
            kernel,
            bias,
            kernel_grad: Tensor::zeros(&[in_features, out_features]),
            bias_grad: Tensor::zeros(&[out_features]),
            cached_input: None,
            in_features,
            out_features,
        })
    }

    /// Returns the input feature size.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the number of output units.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns the weight matrix.
    pub fn kernel(&self) -> &Tensor {
        &self.kernel
    }

    /// Returns the bias vector.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }
}

impl Layer for Dense {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        check_input(input, &[2, 3], self.in_features)?;

        let rows = input.numel() / self.in_features;
        let input_2d = input.reshape(&[rows, self.in_features]);
        let output = input_2d.matmul(&self.kernel).add(&self.bias);

        let mut out_shape = input.shape().to_vec();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features;
        }
        Ok(output.reshape(&out_shape))
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        let expected = self.output_shape(input.shape());
        if grad.shape() != expected.as_slice() {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: grad.shape().to_vec(),
            });
        }

        let rows = input.numel() / self.in_features;
        let input_2d = input.reshape(&[rows, self.in_features]);
        let grad_2d = grad.reshape(&[rows, self.out_features]);

        // dL/dW = x^T @ dL/dy
        self.kernel_grad = input_2d.transpose().matmul(&grad_2d);
        // dL/db = sum(dL/dy, axis=0)
        self.bias_grad = grad_2d.sum_axis(0);

        // dL/dx = dL/dy @ W^T
        let input_grad = grad_2d.matmul(&self.kernel.transpose());
        Ok(input_grad.reshape(input.shape()))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.kernel, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.kernel, &mut self.bias]
    }

    fn gradients(&self) -> Vec<&Tensor> {
        vec![&self.kernel_grad, &self.bias_grad]
    }

    fn parameter_names(&self) -> Vec<String> {
        vec![format!("{}/kernel", self.name), format!("{}/bias", self.name)]
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Dense {
            name: self.name.clone(),
            input_dim: self.in_features,
            units: self.out_features,
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        let mut shape = input_shape.to_vec();
        if let Some(last) = shape.last_mut() {
            *last = self.out_features;
        }
        shape
    }
}
