use rand::Rng;
use rand_distr::StandardNormal;

use super::InMemoryDataset;
use crate::{MlErr, Result};

/// Generates samples of a known line, `y = bias + slope * x + noise`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSynth {
    n: usize,
    bias: f32,
    slope: f32,
    noise_scale: f32,
}

impl LinearSynth {
    /// Creates a new `LinearSynth`.
    ///
    /// # Arguments
    /// * `n` - The amount of samples to generate.
    /// * `bias` - The true intercept.
    /// * `slope` - The true slope.
    /// * `noise_scale` - The standard deviation of the gaussian noise added to every target.
    ///
    /// # Returns
    /// An error if `n` is zero or `noise_scale` is negative or not finite.
    pub fn new(n: usize, bias: f32, slope: f32, noise_scale: f32) -> Result<Self> {
        if n == 0 {
            return Err(MlErr::invalid_config("n_samples", "must be positive"));
        }

        if !noise_scale.is_finite() || noise_scale < 0.0 {
            return Err(MlErr::invalid_config(
                "noise_scale",
                format!("must be finite and non negative, got {noise_scale}"),
            ));
        }

        if !bias.is_finite() || !slope.is_finite() {
            return Err(MlErr::invalid_config("true_bias/true_slope", "must be finite"));
        }

        Ok(Self {
            n,
            bias,
            slope,
            noise_scale,
        })
    }

    /// Draws the dataset: every input from `[0, 1)` first, then every noise
    /// term from a standard normal.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> Result<InMemoryDataset> {
        let xs: Vec<f32> = (0..self.n).map(|_| rng.random::<f32>()).collect();
        let ys = xs
            .iter()
            .map(|&x| {
                let noise: f32 = rng.sample(StandardNormal);
                self.bias + self.slope * x + self.noise_scale * noise
            })
            .collect();

        InMemoryDataset::new(xs, ys)
    }
}
