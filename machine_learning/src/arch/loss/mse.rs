use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

/// Mean squared error, the default training loss for normalized disparity.
#[derive(Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        if y_pred.is_empty() {
            return 0.;
        }

        let sum = Zip::from(&y_pred)
            .and(&y)
            .fold(0., |acc, &p, &t| acc + (p - t) * (p - t));
        sum / y_pred.len() as f32
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let scale = 2. / y_pred.len() as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&p, &t| scale * (p - t))
    }
}
