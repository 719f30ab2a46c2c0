use ndarray::{Array2, ArrayView2};

/// A per-pixel regression loss over `(batch, pixels)` predictions.
pub trait LossFn {
    /// Mean loss of `y_pred` against `y`.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Gradient of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
