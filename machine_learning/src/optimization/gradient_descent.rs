use super::Optimizer;
use crate::{MlErr, Result};

/// Plain stochastic gradient descent, `θ ← θ - lr · g`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `update_params`.
    ///
    /// # Returns
    /// An error if the rate is not a positive, finite number.
    pub fn new(learning_rate: f32) -> Result<Self> {
        if !learning_rate.is_finite() || learning_rate <= 0.0 {
            return Err(MlErr::invalid_config(
                "learning_rate",
                format!("must be positive and finite, got {learning_rate}"),
            ));
        }

        Ok(Self { learning_rate })
    }

    #[inline]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let lr = self.learning_rate;
        params
            .iter_mut()
            .zip(grad)
            .for_each(|(p, g)| *p -= lr * g);
    }
}
