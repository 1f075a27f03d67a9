//! Neural network layers for sonar.
//!
//! This crate provides the small numeric core used to train recurrent
//! timeseries regressors. It includes:
//!
//! - **Tensor**: a dense row-major `f32` array with the operations layers need
//! - **LSTM**: Keras-compatible long short-term memory with recurrent dropout
//!   and back-propagation through time
//! - **Dropout**: inverted dropout with a seeded mask generator
//! - **Dense**: linear projection over the last axis
//! - **LayerSpec**: serializable layer descriptions used by checkpoints
//!
//! # Quick Start
//!
//! ```
//! use sonar_layers::prelude::*;
//!
//! let lstm = Lstm::new("lstm", 4, 16).with_return_sequences(false);
//! let head = Dense::new("dense", 16, 1);
//!
//! let input = Tensor::zeros(&[8, 20, 4]); // batch=8, seq_len=20
//! let hidden = lstm.forward(&input).unwrap();
//! let output = head.forward(&hidden).unwrap();
//! assert_eq!(output.shape(), &[8, 1]);
//! ```
//!
//! # Layer Trait
//!
//! All layers implement the [`Layer`] trait, which provides a unified interface
//! for forward and backward passes:
//!
//! ```
//! use sonar_layers::prelude::*;
//!
//! fn process_layer<L: Layer>(layer: &L, input: &Tensor) -> Tensor {
//!     layer.forward(input).unwrap()
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod dense;
pub mod dropout;
pub mod error;
pub mod initializer;
pub mod layer;
pub mod lstm;
pub mod spec;
pub mod tensor;

// Re-export main types at crate level
pub use dense::Dense;
pub use dropout::Dropout;
pub use error::{LayerError, LayerResult};
pub use initializer::Initializer;
pub use layer::Layer;
pub use lstm::Lstm;
pub use spec::LayerSpec;
pub use tensor::Tensor;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```
/// use sonar_layers::prelude::*;
/// ```
pub mod prelude {
    pub use crate::dense::Dense;
    pub use crate::dropout::Dropout;
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::initializer::Initializer;
    pub use crate::layer::Layer;
    pub use crate::lstm::Lstm;
    pub use crate::spec::LayerSpec;
    pub use crate::tensor::Tensor;
}
