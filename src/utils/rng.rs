//! Seeded random number generation for parameter initialization.
//!
//! Wraps a `StdRng` seeded from a single `u64` so layer initialization is
//! reproducible across runs: the same seed always yields the same weights.

use ndarray::{Array, Dimension, ShapeBuilder};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;

/// Deterministic PRNG with uniform and standard-normal sampling.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    inner: StdRng,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Uniform sample in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        self.inner.gen_range(low..high)
    }

    /// Standard normal sample (mean 0, variance 1).
    pub fn next_normal(&mut self) -> f64 {
        self.inner.sample(StandardNormal)
    }

    /// Array of the given shape filled with `scale * N(0, 1)` samples.
    pub fn normal_array<Sh, D>(&mut self, shape: Sh, scale: f64) -> Array<f64, D>
    where
        D: Dimension,
        Sh: ShapeBuilder<Dim = D>,
    {
        Array::from_shape_simple_fn(shape, || scale * self.next_normal())
    }
}
