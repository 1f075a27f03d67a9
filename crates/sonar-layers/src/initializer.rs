//! Weight initialization utilities matching the Keras defaults for recurrent
//! and dense layers.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Weight initializer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier uniform initialization.
    #[default]
    GlorotUniform,
    /// Orthogonal initialization.
    Orthogonal,
    /// All zeros.
    Zeros,
    /// All ones.
    Ones,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Builds a tensor of `shape` drawing any randomness from `rng`.
    pub fn initialize<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Tensor {
        match self {
            Initializer::Zeros => Tensor::zeros(shape),
            Initializer::Ones => Tensor::ones(shape),
            Initializer::Constant(value) => Tensor::full(shape, *value),
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::rand_uniform(shape, -limit, limit, rng)
            }
            Initializer::Orthogonal => orthogonal(shape, rng),
        }
    }
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    if shape.len() >= 2 {
        let fan_in = shape[0];
        let fan_out = shape[1];
        (fan_in.max(1), fan_out.max(1))
    } else if shape.len() == 1 {
        let dim = shape[0].max(1);
        (dim, dim)
    } else {
        (1, 1)
    }
}

fn orthogonal<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Tensor {
    assert!(shape.len() == 2, "orthogonal initializer expects 2D shape");
    let rows = shape[0];
    let cols = shape[1];

    let (m, n, transpose) = if rows >= cols {
        (rows, cols, false)
    } else {
        (cols, rows, true)
    };

    let data = Tensor::randn(&[m, n], 0.0, 1.0, rng).into_data();

    // Gram-Schmidt orthogonalization on columns
    let mut q = vec![0.0f32; m * n];
    for j in 0..n {
        let mut v: Vec<f32> = (0..m).map(|i| data[i * n + j]).collect();

        for k in 0..j {
            let dot: f32 = (0..m).map(|i| q[i * n + k] * v[i]).sum();
            for (i, vi) in v.iter_mut().enumerate() {
                *vi -= dot * q[i * n + k];
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for (i, vi) in v.iter().enumerate() {
            q[i * n + j] = vi / norm;
        }
    }

    let q = Tensor::from_data(&[m, n], q);
    if transpose {
        q.transpose()
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_glorot_uniform_limit() {
        let mut rng = StdRng::seed_from_u64(0);
        let t = Initializer::GlorotUniform.initialize(&[10, 40], &mut rng);
        let limit = (6.0f32 / 50.0).sqrt();
        assert_eq!(t.shape(), &[10, 40]);
        assert!(t.data().iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn test_orthogonal_rows_are_orthonormal() {
        let mut rng = StdRng::seed_from_u64(3);
        // recurrent kernels are [units, 4 * units]
        let t = Initializer::Orthogonal.initialize(&[4, 16], &mut rng);
        let gram = t.matmul(&t.transpose());
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram.data()[i * 4 + j] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_seeded_initialization_is_deterministic() {
        let a = Initializer::GlorotUniform.initialize(&[3, 5], &mut StdRng::seed_from_u64(9));
        let b = Initializer::GlorotUniform.initialize(&[3, 5], &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant() {
        let mut rng = StdRng::seed_from_u64(0);
        let t = Initializer::Constant(0.5).initialize(&[4], &mut rng);
        assert_eq!(t.data(), &[0.5; 4]);
    }
}
