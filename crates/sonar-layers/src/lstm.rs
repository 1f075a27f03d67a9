#![allow(clippy::needless_range_loop)]
//! Long short-term memory layer with back-propagation through time.
//!
//! Gate layout follows Keras: the kernel, recurrent kernel and bias are packed
//! as `[input, forget, cell, output]` blocks of `units` columns each.
//!
//! ```text
//! z_t = x_t W + h_{t-1} U + b
//! i_t = sigmoid(z_i)   f_t = sigmoid(z_f)
//! g_t = tanh(z_c)      o_t = sigmoid(z_o)
//! c_t = f_t * c_{t-1} + i_t * g_t
//! h_t = o_t * tanh(c_t)
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dropout::dropout_mask;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{check_input, Layer};
use crate::spec::LayerSpec;
use crate::tensor::Tensor;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Values recorded at one timestep of a training forward pass.
#[derive(Debug, Clone)]
struct StepCache {
    /// Input at this step, `[batch, input_dim]`
    x: Tensor,
    /// Previous hidden state after the recurrent dropout mask
    h_prev: Tensor,
    c_prev: Tensor,
    /// Activated gates `[batch, 4 * units]` in i, f, g, o order
    gates: Tensor,
    c: Tensor,
}

/// A single LSTM layer over `[batch, time, features]` input.
///
/// With `return_sequences` the output is `[batch, time, units]`; otherwise
/// only the last hidden state `[batch, units]` is returned.
///
/// # Example
///
/// ```
/// use sonar_layers::layer::Layer;
/// use sonar_layers::lstm::Lstm;
/// use sonar_layers::tensor::Tensor;
///
/// let layer = Lstm::new("lstm", 4, 8).with_return_sequences(true);
/// let output = layer.forward(&Tensor::zeros(&[2, 5, 4])).unwrap();
/// assert_eq!(output.shape(), &[2, 5, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct Lstm {
    name: String,
    input_dim: usize,
    units: usize,
    return_sequences: bool,
    recurrent_dropout: f32,
    training: bool,
    /// Input kernel `[input_dim, 4 * units]`
    kernel: Tensor,
    /// Recurrent kernel `[units, 4 * units]`
    recurrent_kernel: Tensor,
    /// Bias `[4 * units]`
    bias: Tensor,
    kernel_grad: Tensor,
    recurrent_kernel_grad: Tensor,
    bias_grad: Tensor,
    rng: StdRng,
    cache: Option<Vec<StepCache>>,
    recurrent_mask: Option<Tensor>,
    cached_input_shape: Vec<usize>,
}

impl Lstm {
    /// Creates an LSTM layer with randomly initialized weights.
    pub fn new(name: impl Into<String>, input_dim: usize, units: usize) -> Self {
        Self::with_rng(name, input_dim, units, &mut rand::thread_rng())
    }

    /// Creates an LSTM layer drawing initial weights and the dropout seed from `rng`.
    ///
    /// Kernels are Glorot-uniform, recurrent kernels orthogonal and the bias is
    /// zero except for the forget gate, which starts at one.
    pub fn with_rng<R: Rng + ?Sized>(
        name: impl Into<String>,
        input_dim: usize,
        units: usize,
        rng: &mut R,
    ) -> Self {
        let gate_width = 4 * units;
        let kernel = Initializer::GlorotUniform.initialize(&[input_dim, gate_width], rng);
        let recurrent_kernel = Initializer::Orthogonal.initialize(&[units, gate_width], rng);

        let mut bias = Tensor::zeros(&[gate_width]);
        for v in &mut bias.data_mut()[units..2 * units] {
            *v = 1.0;
        }

        Self {
            name: name.into(),
            input_dim,
            units,
            return_sequences: false,
            recurrent_dropout: 0.0,
            training: true,
            kernel,
            recurrent_kernel,
            bias,
            kernel_grad: Tensor::zeros(&[input_dim, gate_width]),
            recurrent_kernel_grad: Tensor::zeros(&[units, gate_width]),
            bias_grad: Tensor::zeros(&[gate_width]),
            rng: StdRng::seed_from_u64(rng.gen()),
            cache: None,
            recurrent_mask: None,
            cached_input_shape: Vec::new(),
        }
    }

    /// Sets whether the full output sequence is returned.
    pub fn with_return_sequences(mut self, return_sequences: bool) -> Self {
        self.return_sequences = return_sequences;
        self
    }

    /// Sets the dropout rate applied to the previous hidden state in training.
    pub fn with_recurrent_dropout(mut self, rate: f32) -> Self {
        self.recurrent_dropout = rate;
        self
    }

    /// Number of hidden units.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Size of the feature axis this layer consumes.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Whether the layer returns the full sequence.
    pub fn return_sequences(&self) -> bool {
        self.return_sequences
    }

    /// Recurrent dropout rate.
    pub fn recurrent_dropout(&self) -> f32 {
        self.recurrent_dropout
    }

    /// Computes activated gates and the new cell state for one step.
    fn step(&self, x: &Tensor, h_prev: &Tensor, c_prev: &Tensor) -> (Tensor, Tensor) {
        let u = self.units;
        let z = x
            .matmul(&self.kernel)
            .add(&h_prev.matmul(&self.recurrent_kernel))
            .add(&self.bias);

        let batch = x.shape()[0];
        let mut gates = z.into_data();
        let mut c = vec![0.0f32; batch * u];
        for b in 0..batch {
            let row = &mut gates[b * 4 * u..(b + 1) * 4 * u];
            for j in 0..u {
                let i = sigmoid(row[j]);
                let f = sigmoid(row[u + j]);
                let g = row[2 * u + j].tanh();
                let o = sigmoid(row[3 * u + j]);
                row[j] = i;
                row[u + j] = f;
                row[2 * u + j] = g;
                row[3 * u + j] = o;
                c[b * u + j] = f * c_prev.data()[b * u + j] + i * g;
            }
        }

        (
            Tensor::from_data(&[batch, 4 * u], gates),
            Tensor::from_data(&[batch, u], c),
        )
    }

    fn hidden(&self, gates: &Tensor, c: &Tensor) -> Tensor {
        let u = self.units;
        let batch = c.shape()[0];
        let mut h = vec![0.0f32; batch * u];
        for b in 0..batch {
            for j in 0..u {
                let o = gates.data()[b * 4 * u + 3 * u + j];
                h[b * u + j] = o * c.data()[b * u + j].tanh();
            }
        }
        Tensor::from_data(&[batch, u], h)
    }

    /// Runs the recurrence, optionally masking `h_{t-1}` and recording a cache.
    fn run(
        &self,
        input: &Tensor,
        mask: Option<&Tensor>,
        mut cache: Option<&mut Vec<StepCache>>,
    ) -> LayerResult<Tensor> {
        check_input(input, &[3], self.input_dim)?;
        let (batch, steps) = (input.shape()[0], input.shape()[1]);
        if steps == 0 {
            return Err(LayerError::ForwardError {
                message: "LSTM input has no timesteps".to_string(),
            });
        }

        let mut h = Tensor::zeros(&[batch, self.units]);
        let mut c = Tensor::zeros(&[batch, self.units]);
        let mut sequence = if self.return_sequences {
            Some(Tensor::zeros(&[batch, steps, self.units]))
        } else {
            None
        };

        for t in 0..steps {
            let x = input.timestep(t);
            let h_prev = match mask {
                Some(m) => h.mul(m),
                None => h,
            };
            let (gates, c_new) = self.step(&x, &h_prev, &c);
            h = self.hidden(&gates, &c_new);

            if let Some(seq) = sequence.as_mut() {
                seq.set_timestep(t, &h);
            }
            if let Some(cache) = cache.as_deref_mut() {
                cache.push(StepCache {
                    x,
                    h_prev,
                    c_prev: c,
                    gates,
                    c: c_new.clone(),
                });
            }
            c = c_new;
        }

        Ok(sequence.unwrap_or(h))
    }
}

impl Layer for Lstm {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.run(input, None, None)
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        check_input(input, &[3], self.input_dim)?;
        let batch = input.shape()[0];

        // one mask per sequence, reused at every step
        let mask = if self.training && self.recurrent_dropout > 0.0 {
            Some(dropout_mask(
                &[batch, self.units],
                self.recurrent_dropout,
                &mut self.rng,
            ))
        } else {
            None
        };

        let mut cache = Vec::with_capacity(input.shape()[1]);
        let output = self.run(input, mask.as_ref(), Some(&mut cache))?;

        self.cache = Some(cache);
        self.recurrent_mask = mask;
        self.cached_input_shape = input.shape().to_vec();
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let cache = self.cache.as_ref().ok_or(LayerError::NotInitialized)?;
        let input_shape = &self.cached_input_shape;
        let expected = self.output_shape(input_shape);
        if grad.shape() != expected.as_slice() {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: grad.shape().to_vec(),
            });
        }

        let u = self.units;
        let (batch, steps) = (input_shape[0], input_shape[1]);

        let mut kernel_grad = Tensor::zeros(self.kernel.shape());
        let mut recurrent_grad = Tensor::zeros(self.recurrent_kernel.shape());
        let mut bias_grad = Tensor::zeros(self.bias.shape());
        let mut input_grad = Tensor::zeros(input_shape);

        let kernel_t = self.kernel.transpose();
        let recurrent_t = self.recurrent_kernel.transpose();

        let mut dh_next = Tensor::zeros(&[batch, u]);
        let mut dc_next = vec![0.0f32; batch * u];

        for t in (0..steps).rev() {
            let step = &cache[t];

            let mut dh = if self.return_sequences {
                grad.timestep(t)
            } else if t == steps - 1 {
                grad.clone()
            } else {
                Tensor::zeros(&[batch, u])
            };
            dh.add_assign(&dh_next);

            let gates = step.gates.data();
            let mut dz = vec![0.0f32; batch * 4 * u];
            for b in 0..batch {
                for j in 0..u {
                    let k = b * u + j;
                    let row = b * 4 * u;
                    let (i, f, g, o) = (
                        gates[row + j],
                        gates[row + u + j],
                        gates[row + 2 * u + j],
                        gates[row + 3 * u + j],
                    );
                    let tc = step.c.data()[k].tanh();
                    let dh_k = dh.data()[k];

                    let d_o = dh_k * tc;
                    let dc = dh_k * o * (1.0 - tc * tc) + dc_next[k];
                    let di = dc * g;
                    let dg = dc * i;
                    let df = dc * step.c_prev.data()[k];
                    dc_next[k] = dc * f;

                    dz[row + j] = di * i * (1.0 - i);
                    dz[row + u + j] = df * f * (1.0 - f);
                    dz[row + 2 * u + j] = dg * (1.0 - g * g);
                    dz[row + 3 * u + j] = d_o * o * (1.0 - o);
                }
            }
            let dz = Tensor::from_data(&[batch, 4 * u], dz);

            kernel_grad.add_assign(&step.x.transpose().matmul(&dz));
            recurrent_grad.add_assign(&step.h_prev.transpose().matmul(&dz));
            bias_grad.add_assign(&dz.sum_axis(0));

            input_grad.set_timestep(t, &dz.matmul(&kernel_t));

            let dh_prev = dz.matmul(&recurrent_t);
            dh_next = match &self.recurrent_mask {
                Some(mask) => dh_prev.mul(mask),
                None => dh_prev,
            };
        }

        self.kernel_grad = kernel_grad;
        self.recurrent_kernel_grad = recurrent_grad;
        self.bias_grad = bias_grad;
        Ok(input_grad)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.kernel, &self.recurrent_kernel, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.kernel, &mut self.recurrent_kernel, &mut self.bias]
    }

    fn gradients(&self) -> Vec<&Tensor> {
        vec![
            &self.kernel_grad,
            &self.recurrent_kernel_grad,
            &self.bias_grad,
        ]
    }

    fn parameter_names(&self) -> Vec<String> {
        vec![
            format!("{}/kernel", self.name),
            format!("{}/recurrent_kernel", self.name),
            format!("{}/bias", self.name),
        ]
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> LayerSpec {
        LayerSpec::Lstm {
            name: self.name.clone(),
            input_dim: self.input_dim,
            units: self.units,
            return_sequences: self.return_sequences,
            recurrent_dropout: self.recurrent_dropout,
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        if self.return_sequences {
            vec![input_shape[0], input_shape[1], self.units]
        } else {
            vec![input_shape[0], self.units]
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
