use ndarray::{Array2, ArrayView2};

/// A differentiable objective over a batch of predictions.
pub trait LossFn {
    /// Returns the loss of `y_pred` against the targets `y`.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Returns the gradient of the loss with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
