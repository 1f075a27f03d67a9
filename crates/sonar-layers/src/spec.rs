//! Serializable layer descriptions.
//!
//! A [`LayerSpec`] captures everything needed to rebuild a layer except its
//! weights. Checkpoints store the ordered list of specs next to the named
//! parameter tensors.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dense::Dense;
use crate::dropout::Dropout;
use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::lstm::Lstm;

/// Structural configuration of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", rename_all = "snake_case")]
pub enum LayerSpec {
    /// LSTM over `[batch, time, input_dim]`.
    Lstm {
        /// Layer name
        name: String,
        /// Size of the feature axis
        input_dim: usize,
        /// Hidden units
        units: usize,
        /// Return `[batch, time, units]` instead of the last state
        return_sequences: bool,
        /// Dropout rate on the previous hidden state
        recurrent_dropout: f32,
    },
    /// Inverted dropout.
    Dropout {
        /// Layer name
        name: String,
        /// Drop probability
        rate: f32,
    },
    /// Linear projection of the last axis.
    Dense {
        /// Layer name
        name: String,
        /// Size of the last input axis
        input_dim: usize,
        /// Output units
        units: usize,
    },
}

impl LayerSpec {
    /// Layer name, also the prefix of its parameter names.
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::Lstm { name, .. }
            | LayerSpec::Dropout { name, .. }
            | LayerSpec::Dense { name, .. } => name,
        }
    }

    /// Human readable layer type, as shown in model summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            LayerSpec::Lstm { .. } => "LSTM",
            LayerSpec::Dropout { .. } => "Dropout",
            LayerSpec::Dense { .. } => "Dense",
        }
    }

    /// Builds a freshly initialized layer from this spec.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ConfigError`] for zero-sized layers or dropout
    /// rates outside `[0, 1)`
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> LayerResult<Box<dyn Layer>> {
        match self {
            LayerSpec::Lstm {
                name,
                input_dim,
                units,
                return_sequences,
                recurrent_dropout,
            } => {
                check_size(name, "input_dim", *input_dim)?;
                check_size(name, "units", *units)?;
                check_rate(name, *recurrent_dropout)?;
                let layer = Lstm::with_rng(name.clone(), *input_dim, *units, rng)
                    .with_return_sequences(*return_sequences)
                    .with_recurrent_dropout(*recurrent_dropout);
                Ok(Box::new(layer))
            }
            LayerSpec::Dropout { name, rate } => {
                check_rate(name, *rate)?;
                Ok(Box::new(Dropout::new(name.clone(), *rate, rng.gen())?))
            }
            LayerSpec::Dense {
                name,
                input_dim,
                units,
            } => {
                check_size(name, "input_dim", *input_dim)?;
                check_size(name, "units", *units)?;
                Ok(Box::new(Dense::with_rng(name.clone(), *input_dim, *units, rng)))
            }
        }
    }
}

fn check_size(layer: &str, field: &str, value: usize) -> LayerResult<()> {
    if value == 0 {
        return Err(LayerError::ConfigError {
            message: format!("{}: {} must be greater than zero", layer, field),
        });
    }
    Ok(())
}

fn check_rate(layer: &str, rate: f32) -> LayerResult<()> {
    if !(0.0..1.0).contains(&rate) {
        return Err(LayerError::ConfigError {
            message: format!("{}: dropout rate must be in [0, 1), got {}", layer, rate),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_serialized_form() {
        let spec = LayerSpec::Lstm {
            name: "lstm".to_string(),
            input_dim: 4,
            units: 8,
            return_sequences: true,
            recurrent_dropout: 0.25,
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(
            json,
            r#"{"class_name":"lstm","name":"lstm","input_dim":4,"units":8,"return_sequences":true,"recurrent_dropout":0.25}"#
        );
        let back: LayerSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_build_matches_spec() {
        let mut rng = StdRng::seed_from_u64(0);
        let specs = vec![
            LayerSpec::Lstm {
                name: "lstm".to_string(),
                input_dim: 3,
                units: 5,
                return_sequences: false,
                recurrent_dropout: 0.1,
            },
            LayerSpec::Dropout {
                name: "dropout".to_string(),
                rate: 0.2,
            },
            LayerSpec::Dense {
                name: "dense".to_string(),
                input_dim: 5,
                units: 1,
            },
        ];
        for spec in specs {
            let layer = spec.build(&mut rng).unwrap();
            assert_eq!(layer.spec(), spec);
            assert_eq!(layer.name(), spec.name());
        }
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let mut rng = StdRng::seed_from_u64(0);
        let zero_units = LayerSpec::Dense {
            name: "dense".to_string(),
            input_dim: 4,
            units: 0,
        };
        assert!(matches!(
            zero_units.build(&mut rng),
            Err(LayerError::ConfigError { .. })
        ));

        let bad_rate = LayerSpec::Lstm {
            name: "lstm".to_string(),
            input_dim: 4,
            units: 2,
            return_sequences: false,
            recurrent_dropout: 1.5,
        };
        assert!(bad_rate.build(&mut rng).is_err());
    }
}
