use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};

use super::Optimizer;
use crate::{MlErr, Result};

/// Adaptive moment estimation over one flat parameter tensor.
#[derive(Debug)]
pub struct Adam {
    lr: f32,
    b1: f32,
    b2: f32,
    eps: f32,
    step: i32,
    m: Array1<f32>,
    v: Array1<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer with zeroed moment estimates.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters of the tensor this instance updates.
    /// * `lr` - The learning rate.
    /// * `b1`, `b2` - Decay rates of the first and second moment estimates.
    /// * `eps` - Added to the second moment's root to keep the step finite.
    pub fn new(len: usize, lr: f32, b1: f32, b2: f32, eps: f32) -> Self {
        Self {
            lr,
            b1,
            b2,
            eps,
            step: 0,
            m: Array1::zeros(len),
            v: Array1::zeros(len),
        }
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        let len = self.m.len();
        for (what, got) in [("adam params", params.len()), ("adam gradient", grad.len())] {
            if got != len {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected: len,
                });
            }
        }

        self.step = self.step.saturating_add(1);
        let Self { lr, b1, b2, eps, .. } = *self;
        let m_scale = 1. / (1. - b1.powi(self.step));
        let v_scale = 1. / (1. - b2.powi(self.step));

        Zip::from(ArrayViewMut1::from(params))
            .and(ArrayView1::from(grad))
            .and(&mut self.m)
            .and(&mut self.v)
            .for_each(|p, &g, m, v| {
                *m = b1 * *m + (1. - b1) * g;
                *v = b2 * *v + (1. - b2) * g * g;
                *p -= lr * (*m * m_scale) / ((*v * v_scale).sqrt() + eps);
            });

        Ok(())
    }
}
