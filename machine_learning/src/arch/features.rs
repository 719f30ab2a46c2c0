use ndarray::{Array2, ArrayView4};

use crate::{MlErr, Result};

/// Per-pixel stereo matching costs.
///
/// For a pixel at column `x`, feature `k` is the mean absolute difference over channels
/// between the left pixel and the right pixel at column `x - k` (clamped at the left border),
/// for every shift in `0..max_shift`. The last feature is the mean left intensity.
#[derive(Debug, Clone, Copy)]
pub struct MatchingCost {
    max_shift: usize,
    scale: f32,
}

impl MatchingCost {
    /// # Arguments
    /// * `max_shift` - The amount of horizontal shifts compared, at least 1.
    /// * `scale` - The intensity value that maps to 1.0, e.g. 255 for 8-bit images.
    pub fn new(max_shift: usize, scale: f32) -> Result<Self> {
        if max_shift == 0 {
            return Err(MlErr::InvalidHyperparameter {
                name: "max_shift",
                reason: "at least one shift must be compared".into(),
            });
        }

        if !(scale.is_finite() && scale > 0.) {
            return Err(MlErr::InvalidHyperparameter {
                name: "input_scale",
                reason: format!("must be a positive number, got {scale}"),
            });
        }

        Ok(Self { max_shift, scale })
    }

    /// The amount of features produced per pixel.
    pub fn width(&self) -> usize {
        self.max_shift + 1
    }

    /// Extracts the features of every pixel of every sample.
    ///
    /// # Returns
    /// A `[N*H*W, width]` matrix, rows in sample-major, row-major pixel order.
    pub fn extract(&self, left: ArrayView4<f32>, right: ArrayView4<f32>) -> Array2<f32> {
        let (n, h, w, c) = left.dim();
        let mut out = Array2::zeros((n * h * w, self.width()));
        if c == 0 {
            return out;
        }

        let inv = 1. / (self.scale * c as f32);

        for (i, mut row) in out.outer_iter_mut().enumerate() {
            let s = i / (h * w);
            let y = (i / w) % h;
            let x = i % w;

            for k in 0..self.max_shift {
                let xr = x.saturating_sub(k);
                let cost: f32 = (0..c)
                    .map(|ch| (left[[s, y, x, ch]] - right[[s, y, xr, ch]]).abs())
                    .sum();
                row[k] = cost * inv;
            }

            let intensity: f32 = (0..c).map(|ch| left[[s, y, x, ch]]).sum();
            row[self.max_shift] = intensity * inv;
        }

        out
    }
}
