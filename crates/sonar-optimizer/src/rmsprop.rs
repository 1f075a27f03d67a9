//! RMSprop optimizer.
//!
//! RMSprop maintains a moving average of squared gradients and divides each
//! step by its root, which adapts the step size per element.
//!
//! # Example
//!
//! ```
//! use sonar_optimizer::{Optimizer, Rmsprop, OptimizerConfig};
//!
//! let config = OptimizerConfig::Rmsprop {
//!     learning_rate: 0.001,
//!     rho: 0.9,
//!     momentum: 0.0,
//!     epsilon: 1e-7,
//! };
//! let mut rmsprop = Rmsprop::new(config).unwrap();
//! let mut params = vec![1.0, 2.0, 3.0];
//! rmsprop.apply_gradients(&mut params, &[0.1, 0.2, 0.3]);
//! ```

use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// RMSprop optimizer with adaptive learning rates.
///
/// Updates parameters using the formula:
/// ```text
/// velocity = rho * velocity + (1 - rho) * gradient^2
/// step = learning_rate * gradient / sqrt(velocity + epsilon)
/// if momentum > 0:
///     mom = momentum * mom + step
///     param = param - mom
/// else:
///     param = param - step
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rmsprop {
    learning_rate: f32,
    rho: f32,
    momentum: f32,
    epsilon: f32,
    /// Moving average of squared gradients.
    velocity: Vec<f32>,
    /// Momentum buffer, empty unless momentum > 0.
    mom: Vec<f32>,
    config: OptimizerConfig,
}

impl Rmsprop {
    /// Creates a new RMSprop optimizer with the given parameters.
    pub fn with_params(learning_rate: f32, rho: f32, momentum: f32, epsilon: f32) -> Self {
        let config = OptimizerConfig::Rmsprop {
            learning_rate,
            rho,
            momentum,
            epsilon,
        };
        Self {
            learning_rate,
            rho,
            momentum,
            epsilon,
            velocity: Vec::new(),
            mom: Vec::new(),
            config,
        }
    }

    /// Returns the moving average of squared gradients.
    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }

    /// Returns the current momentum buffer.
    pub fn momentum_buffer(&self) -> &[f32] {
        &self.mom
    }

    /// Resets the optimizer state.
    pub fn reset_state(&mut self) {
        self.velocity.clear();
        self.mom.clear();
    }
}

impl Optimizer for Rmsprop {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Rmsprop {
                learning_rate,
                rho,
                momentum,
                epsilon,
            } => Ok(Self::with_params(learning_rate, rho, momentum, epsilon)),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Rmsprop".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        debug_assert_eq!(params.len(), gradients.len());
        if self.velocity.len() != params.len() {
            self.velocity = vec![0.0; params.len()];
            if self.momentum > 0.0 {
                self.mom = vec![0.0; params.len()];
            }
        }

        for (i, (p, g)) in params.iter_mut().zip(gradients.iter()).enumerate() {
            self.velocity[i] = self.rho * self.velocity[i] + (1.0 - self.rho) * g * g;
            let step = self.learning_rate * g / (self.velocity[i] + self.epsilon).sqrt();

            if self.momentum > 0.0 {
                self.mom[i] = self.momentum * self.mom[i] + step;
                *p -= self.mom[i];
            } else {
                *p -= step;
            }
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmsprop_first_step() {
        let mut rmsprop = Rmsprop::with_params(0.1, 0.9, 0.0, 1e-7);
        let mut params = vec![1.0, 2.0];
        rmsprop.apply_gradients(&mut params, &[1.0, -2.0]);

        // velocity = 0.1 * g^2, so step = lr * g / sqrt(0.1 g^2) = lr * sign(g) * sqrt(10)
        let expected = 0.1 * 10f32.sqrt();
        assert!((params[0] - (1.0 - expected)).abs() < 1e-4);
        assert!((params[1] - (2.0 + expected)).abs() < 1e-4);
    }

    #[test]
    fn test_rmsprop_velocity_decay() {
        let mut rmsprop = Rmsprop::new(OptimizerConfig::default()).unwrap();
        let mut params = vec![1.0];

        rmsprop.apply_gradients(&mut params, &[1.0]);
        assert!((rmsprop.velocity()[0] - 0.1).abs() < 1e-6);

        rmsprop.apply_gradients(&mut params, &[1.0]);
        assert!((rmsprop.velocity()[0] - 0.19).abs() < 1e-6);
    }

    #[test]
    fn test_rmsprop_zero_gradient_is_noop() {
        let mut rmsprop = Rmsprop::new(OptimizerConfig::default()).unwrap();
        let mut params = vec![1.0, 2.0, 3.0];
        rmsprop.apply_gradients(&mut params, &[0.0, 0.0, 0.0]);
        assert_eq!(params, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rmsprop_with_momentum() {
        let mut rmsprop = Rmsprop::with_params(0.1, 0.9, 0.9, 1e-7);
        let mut params = vec![1.0];
        rmsprop.apply_gradients(&mut params, &[1.0]);
        assert!(rmsprop.momentum_buffer()[0] > 0.0);
    }

    #[test]
    fn test_rmsprop_state_resizes_and_resets() {
        let mut rmsprop = Rmsprop::with_params(0.01, 0.9, 0.9, 1e-7);
        let mut params = vec![1.0, 2.0];
        rmsprop.apply_gradients(&mut params, &[1.0, 1.0]);
        assert_eq!(rmsprop.velocity().len(), 2);
        assert_eq!(rmsprop.momentum_buffer().len(), 2);

        rmsprop.reset_state();
        assert!(rmsprop.velocity().is_empty());
        assert!(rmsprop.momentum_buffer().is_empty());
    }

    #[test]
    fn test_rmsprop_config_mismatch() {
        let result = Rmsprop::new(OptimizerConfig::Sgd {
            learning_rate: 0.01,
        });
        assert!(matches!(
            result,
            Err(OptimizerError::ConfigMismatch { .. })
        ));
    }
}
