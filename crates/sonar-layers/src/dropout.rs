//! Inverted dropout.
//!
//! During training each element is zeroed with probability `rate` and the
//! survivors are scaled by `1 / (1 - rate)`. Inference is the identity.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::spec::LayerSpec;
use crate::tensor::Tensor;

/// Dropout layer with its own seeded mask generator.
#[derive(Debug, Clone)]
pub struct Dropout {
    name: String,
    rate: f32,
    training: bool,
    rng: StdRng,
    /// Scaled keep-mask from the last training forward pass
    mask: Option<Tensor>,
}

impl Dropout {
    /// Creates a dropout layer.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ConfigError`] unless `0 <= rate < 1`
    pub fn new(name: impl Into<String>, rate: f32, seed: u64) -> LayerResult<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(LayerError::ConfigError {
                message: format!("dropout rate must be in [0, 1), got {}", rate),
            });
        }
        Ok(Self {
            name: name.into(),
            rate,
            training: true,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        })
    }

    /// Returns the drop probability.
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

/// Draws an inverted-dropout mask of `shape`: entries are `0` or `1 / (1 - rate)`.
pub(crate) fn dropout_mask(shape: &[usize], rate: f32, rng: &mut StdRng) -> Tensor {
    let numel: usize = shape.iter().product();
    if rate <= 0.0 {
        return Tensor::ones(shape);
    }
    let keep = 1.0 - rate;
    let data = (0..numel)
        .map(|_| {
            if rng.gen::<f32>() < rate {
                0.0
            } else {
                1.0 / keep
            }
        })
        .collect();
    Tensor::from_data(shape, data)
}

impl Layer for Dropout {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.clone())
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        if !self.training || self.rate == 0.0 {
            self.mask = Some(Tensor::ones(input.shape()));
            return Ok(input.clone());
        }
        let mask = dropout_mask(input.shape(), self.rate, &mut self.rng);
        let output = input.mul(&mask);
        self.mask = Some(mask);
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let mask = self.mask.as_ref().ok_or(LayerError::NotInitialized)?;
        if mask.shape() != grad.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: mask.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }
        Ok(grad.mul(mask))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    fn gradients(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn parameter_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Dropout {
            name: self.name.clone(),
            rate: self.rate,
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        input_shape.to_vec()
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rate() {
        assert!(Dropout::new("dropout", 1.0, 0).is_err());
        assert!(Dropout::new("dropout", -0.1, 0).is_err());
        assert!(Dropout::new("dropout", 0.0, 0).is_ok());
    }

    #[test]
    fn test_inference_is_identity() {
        let layer = Dropout::new("dropout", 0.5, 1).unwrap();
        let input = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(layer.forward(&input).unwrap(), input);
    }

    #[test]
    fn test_training_mask_is_scaled() {
        let mut layer = Dropout::new("dropout", 0.5, 1).unwrap();
        let input = Tensor::ones(&[64, 64]);
        let output = layer.forward_train(&input).unwrap();

        assert!(output.data().iter().all(|&v| v == 0.0 || v == 2.0));
        let dropped = output.data().iter().filter(|&&v| v == 0.0).count();
        let fraction = dropped as f32 / output.numel() as f32;
        assert!((fraction - 0.5).abs() < 0.05);

        // backward routes gradients through the same mask
        let grad = layer.backward(&Tensor::ones(&[64, 64])).unwrap();
        assert_eq!(grad, output);
    }

    #[test]
    fn test_eval_mode_disables_mask() {
        let mut layer = Dropout::new("dropout", 0.9, 1).unwrap();
        layer.set_training(false);
        let input = Tensor::ones(&[4, 4]);
        assert_eq!(layer.forward_train(&input).unwrap(), input);
    }

    #[test]
    fn test_backward_before_forward() {
        let mut layer = Dropout::new("dropout", 0.2, 1).unwrap();
        assert!(matches!(
            layer.backward(&Tensor::ones(&[1, 1])),
            Err(LayerError::NotInitialized)
        ));
    }
}
