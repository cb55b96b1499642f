use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::Result;

/// Named parameter tensors of a model, flattened.
pub type StateDict = BTreeMap<String, Vec<f32>>;

/// A differentiable model whose parameters live outside of it, in a flat slice.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Draws a fresh set of parameters for this model.
    ///
    /// # Arguments
    /// * `rng` - The source of randomness.
    ///
    /// # Returns
    /// A vector of `size()` parameters.
    fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>>;

    /// Computes the model's output for a batch of inputs.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The inputs, one row per sample.
    /// * `track_grad` - Whether to keep what `backward` needs. When false any
    ///   record kept by a previous tracked pass is dropped.
    ///
    /// # Returns
    /// The predictions, one row per sample.
    fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        track_grad: bool,
    ) -> Result<Array2<f32>>;

    /// Backpropagates `d`, the gradient of the loss with respect to the last
    /// tracked forward's output, writing the parameter gradient into `grad`.
    ///
    /// Consumes the record of the tracked forward.
    ///
    /// # Returns
    /// The gradient with respect to the inputs, or `MlErr::GradientNotTracked`
    /// if no tracked forward precedes this call.
    fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView2<f32>,
    ) -> Result<Array2<f32>>;

    /// Names and reshapes `params` the way they are reported to the outside.
    fn state_dict(&self, params: &[f32]) -> Result<StateDict>;
}
