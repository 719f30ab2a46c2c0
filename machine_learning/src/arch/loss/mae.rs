use ndarray::{Array2, ArrayView2};

use super::LossFn;

/// Mean absolute error, the training-time counterpart of the end-point error.
#[derive(Default, Clone, Copy)]
pub struct Mae;

impl Mae {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mae {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (&y_pred - &y).mapv(f32::abs).mean().unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len() as f32;
        (&y_pred - &y).mapv(|d| {
            if d > 0. {
                1. / n
            } else if d < 0. {
                -1. / n
            } else {
                0.
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mae_averages_absolute_differences() {
        let y_pred = array![[0.0, 0.5], [1.0, 0.25]];
        let y = array![[0.5, 0.5], [0.0, 0.75]];

        assert!((Mae.loss(y_pred.view(), y.view()) - 0.5).abs() < 1e-6);
        assert_eq!(
            Mae.loss_prime(y_pred.view(), y.view()),
            array![[-0.25, 0.0], [0.25, -0.25]]
        );
    }
}
