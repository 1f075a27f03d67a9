//! Optimizers for sonar model training.
//!
//! Each optimizer implements the [`Optimizer`] trait and updates one flat
//! parameter buffer in place. Trainers keep one optimizer instance per
//! parameter tensor so that per-element state lines up with the buffer.
//!
//! # Available Optimizers
//!
//! - [`Rmsprop`] - Root Mean Square Propagation (the training default)
//! - [`Sgd`] - Stochastic Gradient Descent
//!
//! # Example
//!
//! ```
//! use sonar_optimizer::{Optimizer, Rmsprop, OptimizerConfig};
//!
//! let mut optimizer = Rmsprop::new(OptimizerConfig::default()).unwrap();
//!
//! let mut params = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//!
//! optimizer.apply_gradients(&mut params, &gradients);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod rmsprop;
mod sgd;

pub use rmsprop::Rmsprop;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch { expected: String, got: String },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for different optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
    },

    /// RMSprop configuration.
    Rmsprop {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Decay rate for the moving average of squared gradients.
        rho: f32,
        /// Momentum coefficient.
        momentum: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },
}

impl Default for OptimizerConfig {
    /// RMSprop with the Keras defaults.
    fn default() -> Self {
        OptimizerConfig::Rmsprop {
            learning_rate: 0.001,
            rho: 0.9,
            momentum: 0.0,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerConfig {
    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Rmsprop { .. } => "Rmsprop",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate,
            OptimizerConfig::Rmsprop { learning_rate, .. } => *learning_rate,
        }
    }

    /// Checks that every hyper-parameter lies in its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let learning_rate = self.learning_rate();
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                learning_rate
            )));
        }
        if let OptimizerConfig::Rmsprop {
            rho,
            momentum,
            epsilon,
            ..
        } = self
        {
            if !(0.0..1.0).contains(rho) {
                return Err(OptimizerError::InvalidParameter(format!(
                    "rho must be in [0, 1), got {}",
                    rho
                )));
            }
            if !(0.0..1.0).contains(momentum) {
                return Err(OptimizerError::InvalidParameter(format!(
                    "momentum must be in [0, 1), got {}",
                    momentum
                )));
            }
            if *epsilon <= 0.0 {
                return Err(OptimizerError::InvalidParameter(format!(
                    "epsilon must be positive, got {}",
                    epsilon
                )));
            }
        }
        Ok(())
    }
}

/// Trait for parameter optimizers.
///
/// Optimizers are responsible for updating parameter buffers based on
/// computed gradients.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Applies gradients to update the parameters in place.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter buffer to update.
    /// * `gradients` - The gradient buffer, same length as `params`.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

/// Creates an optimizer from the given configuration.
///
/// # Example
///
/// ```
/// use sonar_optimizer::{create_optimizer, OptimizerConfig};
///
/// let optimizer = create_optimizer(OptimizerConfig::default()).unwrap();
/// assert_eq!(optimizer.config().name(), "Rmsprop");
/// ```
///
/// # Errors
///
/// Returns an error if the configuration fails [`OptimizerConfig::validate`].
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    config.validate()?;
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Rmsprop { .. } => Box::new(Rmsprop::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
pub trait OptimizerDyn: Send {
    /// Applies gradients to update the parameters in place.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

impl<T: Optimizer + Send> OptimizerDyn for T {
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, params, gradients)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name() {
        let sgd = OptimizerConfig::Sgd { learning_rate: 0.01 };
        assert_eq!(sgd.name(), "Sgd");
        assert_eq!(OptimizerConfig::default().name(), "Rmsprop");
    }

    #[test]
    fn test_default_matches_keras_rmsprop() {
        match OptimizerConfig::default() {
            OptimizerConfig::Rmsprop {
                learning_rate,
                rho,
                momentum,
                epsilon,
            } => {
                assert!((learning_rate - 0.001).abs() < 1e-9);
                assert!((rho - 0.9).abs() < 1e-9);
                assert_eq!(momentum, 0.0);
                assert!((epsilon - 1e-7).abs() < 1e-12);
            }
            other => panic!("unexpected default {:?}", other),
        }
    }

    #[test]
    fn test_validate() {
        assert!(OptimizerConfig::default().validate().is_ok());
        assert!(OptimizerConfig::Sgd { learning_rate: 0.0 }.validate().is_err());
        let bad_rho = OptimizerConfig::Rmsprop {
            learning_rate: 0.001,
            rho: 1.0,
            momentum: 0.0,
            epsilon: 1e-7,
        };
        assert!(matches!(
            bad_rho.validate(),
            Err(OptimizerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_create_optimizer() {
        let config = OptimizerConfig::Sgd { learning_rate: 0.01 };
        let mut optimizer = create_optimizer(config).unwrap();

        let mut params = vec![1.0, 2.0];
        let gradients = vec![1.0, 1.0];

        optimizer.apply_gradients(&mut params, &gradients);

        assert!(params[0] < 1.0);
        assert!(params[1] < 2.0);
    }

    #[test]
    fn test_create_optimizer_rejects_invalid() {
        let config = OptimizerConfig::Sgd {
            learning_rate: -1.0,
        };
        assert!(create_optimizer(config).is_err());
    }

    #[test]
    fn test_optimizer_config_serialization() {
        let config = OptimizerConfig::default();
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: OptimizerConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }
}
