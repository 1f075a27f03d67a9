//! Sequential model assembly.
//!
//! The network is a plain stack of layers: an optional two-layer LSTM, a
//! dropout layer and a single-unit dense head. [`ModelConfig`] describes it,
//! [`SequentialModel`] runs it and converts to and from checkpoint state.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sonar_checkpoint::{CheckpointError, ModelState};
use sonar_layers::{Layer, LayerError, LayerSpec, Tensor};
use tracing::{info, warn};

use crate::error::{Result, TrainingError};

/// Recurrent layer family requested on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LayerKind {
    /// Two stacked LSTM layers.
    #[default]
    Lstm,
    /// Accepted for compatibility; builds the same stack as [`LayerKind::Lstm`].
    Gru,
    /// Any other name: no recurrent layers at all.
    Other(String),
}

impl LayerKind {
    /// Parses a layer name. Matching is exact and never fails.
    ///
    /// ```
    /// use sonar_training::model::LayerKind;
    ///
    /// assert_eq!(LayerKind::parse("LSTM"), LayerKind::Lstm);
    /// assert_eq!(LayerKind::parse("lstm"), LayerKind::Other("lstm".to_string()));
    /// ```
    pub fn parse(name: &str) -> Self {
        match name {
            "LSTM" => LayerKind::Lstm,
            "GRU" => LayerKind::Gru,
            other => LayerKind::Other(other.to_string()),
        }
    }

    /// Whether this kind adds the recurrent layers.
    pub fn is_recurrent(&self) -> bool {
        matches!(self, LayerKind::Lstm | LayerKind::Gru)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Lstm => f.write_str("LSTM"),
            LayerKind::Gru => f.write_str("GRU"),
            LayerKind::Other(name) => f.write_str(name),
        }
    }
}

impl FromStr for LayerKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(LayerKind::parse(s))
    }
}

impl From<String> for LayerKind {
    fn from(name: String) -> Self {
        LayerKind::parse(&name)
    }
}

impl From<LayerKind> for String {
    fn from(kind: LayerKind) -> Self {
        kind.to_string()
    }
}

/// Structure of the network to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Recurrent layer family.
    pub layer: LayerKind,
    /// Hidden units of each LSTM layer.
    pub units: usize,
    /// Rate of the dropout layer and of the LSTM recurrent dropout.
    pub dropout: f32,
    /// Timesteps per input window.
    pub sequence_length: usize,
    /// Features per timestep.
    pub num_features: usize,
    /// Seed for weight initialization and dropout masks.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            layer: LayerKind::Lstm,
            units: 32,
            dropout: 0.0,
            sequence_length: 120,
            num_features: 1,
            seed: 1337,
        }
    }
}

impl ModelConfig {
    /// Sets the recurrent layer family.
    pub fn with_layer(mut self, layer: LayerKind) -> Self {
        self.layer = layer;
        self
    }

    /// Sets the number of LSTM units.
    pub fn with_units(mut self, units: usize) -> Self {
        self.units = units;
        self
    }

    /// Sets the dropout rate.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Sets the per-sample input shape.
    pub fn with_input(mut self, sequence_length: usize, num_features: usize) -> Self {
        self.sequence_length = sequence_length;
        self.num_features = num_features;
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Layer specs in forward order.
    ///
    /// `Lstm` and `Gru` produce identical specs.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        let mut specs = Vec::with_capacity(4);
        let mut width = self.num_features;
        if self.layer.is_recurrent() {
            specs.push(LayerSpec::Lstm {
                name: "lstm".to_string(),
                input_dim: self.num_features,
                units: self.units,
                return_sequences: true,
                recurrent_dropout: self.dropout,
            });
            specs.push(LayerSpec::Lstm {
                name: "lstm_1".to_string(),
                input_dim: self.units,
                units: self.units,
                return_sequences: false,
                recurrent_dropout: self.dropout,
            });
            width = self.units;
        }
        specs.push(LayerSpec::Dropout {
            name: "dropout".to_string(),
            rate: self.dropout,
        });
        specs.push(LayerSpec::Dense {
            name: "dense".to_string(),
            input_dim: width,
            units: 1,
        });
        specs
    }
}

/// A stack of layers applied in order to `[batch, time, features]` input.
pub struct SequentialModel {
    input_shape: [usize; 2],
    layers: Vec<Box<dyn Layer>>,
}

impl fmt::Debug for SequentialModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialModel")
            .field("input_shape", &self.input_shape)
            .field("layers", &self.layer_specs())
            .finish()
    }
}

impl SequentialModel {
    /// Builds a freshly initialized model.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] for a zero-sized input and a
    /// layer error for invalid units or dropout.
    pub fn build(config: &ModelConfig) -> Result<Self> {
        match &config.layer {
            LayerKind::Gru => {
                warn!("No dedicated GRU layer is available, building the LSTM stack instead")
            }
            LayerKind::Other(name) => {
                warn!(layer = %name, "Unrecognized layer type, no recurrent layers added")
            }
            LayerKind::Lstm => {}
        }
        Self::from_specs(
            [config.sequence_length, config.num_features],
            &config.layer_specs(),
            config.seed,
        )
    }

    /// Builds a model from explicit layer specs, checking that consecutive
    /// layers fit together.
    pub fn from_specs(input_shape: [usize; 2], specs: &[LayerSpec], seed: u64) -> Result<Self> {
        if input_shape.contains(&0) {
            return Err(TrainingError::InvalidConfig(format!(
                "input shape must be non-empty, got {:?}",
                input_shape
            )));
        }
        if specs.is_empty() {
            return Err(TrainingError::InvalidConfig(
                "a model needs at least one layer".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut shape = vec![1, input_shape[0], input_shape[1]];
        let mut layers = Vec::with_capacity(specs.len());
        for spec in specs {
            let accepted = match spec {
                LayerSpec::Lstm { input_dim, .. } => shape.len() == 3 && shape[2] == *input_dim,
                LayerSpec::Dense { input_dim, .. } => shape.last() == Some(input_dim),
                LayerSpec::Dropout { .. } => true,
            };
            if !accepted {
                return Err(TrainingError::InvalidConfig(format!(
                    "layer '{}' ({}) cannot take input of shape {:?}",
                    spec.name(),
                    spec.kind(),
                    shape
                )));
            }
            let layer = spec.build(&mut rng)?;
            shape = layer.output_shape(&shape);
            layers.push(layer);
        }

        Ok(Self {
            input_shape,
            layers,
        })
    }

    /// Rebuilds a model from checkpoint state and loads its weights.
    ///
    /// # Errors
    ///
    /// Returns a checkpoint error if a parameter is missing, malformed or
    /// unexpected.
    pub fn from_state(state: &ModelState, seed: u64) -> Result<Self> {
        let input_shape = match state.input_shape.as_slice() {
            [time, features] => [*time, *features],
            other => {
                return Err(CheckpointError::Corrupted(format!(
                    "input shape must have two dimensions, got {:?}",
                    other
                ))
                .into())
            }
        };
        let mut model = Self::from_specs(input_shape, &state.layers, seed)?;

        let mut loaded = 0;
        for layer in model.layers.iter_mut() {
            for name in layer.parameter_names() {
                let value = state.param(&name)?;
                layer.load_parameter(&name, &value)?;
                loaded += 1;
            }
        }
        if loaded != state.params.len() {
            return Err(CheckpointError::Corrupted(format!(
                "checkpoint holds {} parameters, model uses {}",
                state.params.len(),
                loaded
            ))
            .into());
        }
        info!(epoch = state.epoch, "Restored model weights");
        Ok(model)
    }

    /// Captures layer specs and weights as checkpoint state.
    pub fn to_state(&self, epoch: usize) -> ModelState {
        let mut state = ModelState::new(epoch, self.input_shape.to_vec(), self.layer_specs());
        for layer in &self.layers {
            for (name, param) in layer.parameter_names().into_iter().zip(layer.parameters()) {
                state.add_param(name, param);
            }
        }
        state
    }

    /// Per-sample input shape, `[sequence_length, num_features]`.
    pub fn input_shape(&self) -> [usize; 2] {
        self.input_shape
    }

    /// Output shape for a batch of `batch` windows.
    pub fn output_shape(&self, batch: usize) -> Vec<usize> {
        self.layers.iter().fold(
            vec![batch, self.input_shape[0], self.input_shape[1]],
            |shape, layer| layer.output_shape(&shape),
        )
    }

    /// Layer specs in forward order.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        self.layers.iter().map(|l| l.spec()).collect()
    }

    /// Layers in forward order.
    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    fn check_input(&self, inputs: &Tensor) -> Result<()> {
        let shape = inputs.shape();
        if shape.len() != 3 || shape[1..] != self.input_shape {
            let batch = shape.first().copied().unwrap_or(0);
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch, self.input_shape[0], self.input_shape[1]],
                actual: shape.to_vec(),
            }
            .into());
        }
        Ok(())
    }

    /// Inference forward pass; dropout is inactive.
    pub fn forward(&self, inputs: &Tensor) -> Result<Tensor> {
        self.check_input(inputs)?;
        let mut x = inputs.clone();
        for layer in &self.layers {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }

    /// Training forward pass that caches what [`SequentialModel::backward`] needs.
    pub fn forward_train(&mut self, inputs: &Tensor) -> Result<Tensor> {
        self.check_input(inputs)?;
        let mut x = inputs.clone();
        for layer in self.layers.iter_mut() {
            x = layer.forward_train(&x)?;
        }
        Ok(x)
    }

    /// Backpropagates the loss gradient w.r.t. the model output, leaving
    /// parameter gradients in each layer.
    pub fn backward(&mut self, grad: &Tensor) -> Result<()> {
        let mut grad = grad.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(())
    }

    /// Switches every layer between training and inference mode.
    pub fn set_training(&mut self, training: bool) {
        for layer in self.layers.iter_mut() {
            layer.set_training(training);
        }
    }

    /// All parameters, layer by layer.
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    /// Mutable parameters, in the order of [`SequentialModel::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = Vec::new();
        for layer in self.layers.iter_mut() {
            params.extend(layer.parameters_mut());
        }
        params
    }

    /// Gradients from the last backward pass, in parameter order.
    pub fn gradients(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(|l| l.gradients()).collect()
    }

    /// Renders a layer table with output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let rule = "-".repeat(68);
        let mut out = String::new();
        out.push_str("Model: \"sequential\"\n");
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "{:<28}{:<26}{:>14}\n",
            "Layer (type)", "Output Shape", "Param #"
        ));
        out.push_str(&rule);
        out.push('\n');

        let mut shape = vec![1, self.input_shape[0], self.input_shape[1]];
        for layer in &self.layers {
            shape = layer.output_shape(&shape);
            let dims: Vec<String> = shape[1..].iter().map(|d| d.to_string()).collect();
            out.push_str(&format!(
                "{:<28}{:<26}{:>14}\n",
                format!("{} ({})", layer.name(), layer.spec().kind()),
                format!("(None, {})", dims.join(", ")),
                layer.num_parameters()
            ));
        }
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("Total params: {}", self.num_parameters()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(layer: &str) -> ModelConfig {
        ModelConfig::default()
            .with_layer(LayerKind::parse(layer))
            .with_units(4)
            .with_dropout(0.2)
            .with_input(6, 3)
            .with_seed(7)
    }

    #[test]
    fn test_layer_kind_parse() {
        assert_eq!(LayerKind::parse("GRU"), LayerKind::Gru);
        assert_eq!("LSTM".parse::<LayerKind>().unwrap(), LayerKind::Lstm);
        let other = LayerKind::parse("Transformer");
        assert!(!other.is_recurrent());
        assert_eq!(other.to_string(), "Transformer");
    }

    #[test]
    fn test_layer_kind_serializes_as_name() {
        let json = serde_json::to_string(&LayerKind::Gru).unwrap();
        assert_eq!(json, "\"GRU\"");
        let back: LayerKind = serde_json::from_str("\"conv\"").unwrap();
        assert_eq!(back, LayerKind::Other("conv".to_string()));
    }

    #[test]
    fn test_lstm_stack() {
        let model = SequentialModel::build(&config("LSTM")).unwrap();
        let names: Vec<String> = model.layer_specs().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["lstm", "lstm_1", "dropout", "dense"]);
        assert_eq!(model.output_shape(5), vec![5, 1]);

        let out = model.forward(&Tensor::ones(&[5, 6, 3])).unwrap();
        assert_eq!(out.shape(), &[5, 1]);
        // 4 * (3 + 4 + 1) * 4 + 4 * (4 + 4 + 1) * 4 + 4 + 1
        assert_eq!(model.num_parameters(), 128 + 144 + 5);
    }

    #[test]
    fn test_gru_builds_lstm_stack() {
        let lstm = config("LSTM").layer_specs();
        let gru = config("GRU").layer_specs();
        assert_eq!(
            serde_json::to_string(&lstm).unwrap(),
            serde_json::to_string(&gru).unwrap()
        );
    }

    #[test]
    fn test_unknown_layer_skips_recurrence() {
        let model = SequentialModel::build(&config("unknown")).unwrap();
        let kinds: Vec<&str> = model.layer_specs().iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec!["Dropout", "Dense"]);
        let out = model.forward(&Tensor::ones(&[2, 6, 3])).unwrap();
        assert_eq!(out.shape(), &[2, 6, 1]);
    }

    #[test]
    fn test_rejects_wrong_input() {
        let model = SequentialModel::build(&config("LSTM")).unwrap();
        assert!(model.forward(&Tensor::ones(&[2, 5, 3])).is_err());
        assert!(model.forward(&Tensor::ones(&[2, 18])).is_err());
    }

    #[test]
    fn test_from_specs_rejects_incompatible_layers() {
        let specs = vec![LayerSpec::Dense {
            name: "dense".to_string(),
            input_dim: 7,
            units: 1,
        }];
        assert!(matches!(
            SequentialModel::from_specs([4, 3], &specs, 0),
            Err(TrainingError::InvalidConfig(_))
        ));
        assert!(SequentialModel::from_specs([0, 3], &[], 0).is_err());
    }

    #[test]
    fn test_state_round_trip_reproduces_predictions() {
        let model = SequentialModel::build(&config("LSTM")).unwrap();
        let state = model.to_state(3);
        assert_eq!(state.input_shape, vec![6, 3]);
        assert_eq!(state.num_parameters(), model.num_parameters());

        // a different seed proves the weights come from the state
        let restored = SequentialModel::from_state(&state, 99).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let input = Tensor::randn(&[4, 6, 3], 0.0, 1.0, &mut rng);
        assert_eq!(
            model.forward(&input).unwrap(),
            restored.forward(&input).unwrap()
        );
    }

    #[test]
    fn test_from_state_detects_missing_parameters() {
        let model = SequentialModel::build(&config("LSTM")).unwrap();
        let mut state = model.to_state(1);
        state.params.remove("lstm_1/bias");
        assert!(matches!(
            SequentialModel::from_state(&state, 0),
            Err(TrainingError::Checkpoint(_))
        ));

        let mut state = model.to_state(1);
        state.add_param("extra/kernel", &Tensor::zeros(&[1]));
        assert!(SequentialModel::from_state(&state, 0).is_err());
    }

    #[test]
    fn test_summary_lists_layers() {
        let model = SequentialModel::build(&config("LSTM")).unwrap();
        let summary = model.summary();
        assert!(summary.contains("lstm (LSTM)"));
        assert!(summary.contains("(None, 6, 4)"));
        assert!(summary.contains("dense (Dense)"));
        assert!(summary.ends_with(&format!("Total params: {}", model.num_parameters())));
    }
}
