use std::num::NonZeroUsize;

use ndarray::{Array4, ArrayView4, Axis};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// The spatial and channel dimensions shared by every sample of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl DatasetShape {
    /// Creates a new `DatasetShape`.
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// The amount of pixels in a single disparity map.
    pub fn pixels(&self) -> usize {
        self.height * self.width
    }

    /// The expected `[N,H,W,C]` shape of an image tensor holding `samples` samples.
    pub fn image_dims(&self, samples: usize) -> [usize; 4] {
        [samples, self.height, self.width, self.channels]
    }

    /// The expected `[N,H,W,1]` shape of a disparity tensor holding `samples` samples.
    pub fn disparity_dims(&self, samples: usize) -> [usize; 4] {
        [samples, self.height, self.width, 1]
    }
}

/// Borrowed left and right image tensors of the same samples.
#[derive(Debug, Clone, Copy)]
pub struct StereoView<'a> {
    left: ArrayView4<'a, f32>,
    right: ArrayView4<'a, f32>,
}

impl<'a> StereoView<'a> {
    /// Pairs up a left and a right image tensor.
    ///
    /// # Errors
    /// Returns `MlErr::ShapeMismatch` if both tensors don't have the exact same shape.
    pub fn new(left: ArrayView4<'a, f32>, right: ArrayView4<'a, f32>) -> Result<Self> {
        if left.shape() != right.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "right images",
                got: right.shape().to_vec(),
                expected: left.shape().to_vec(),
            });
        }

        Ok(Self { left, right })
    }

    /// The amount of samples in the view.
    pub fn len(&self) -> usize {
        self.left.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn left(&self) -> ArrayView4<'a, f32> {
        self.left
    }

    pub fn right(&self) -> ArrayView4<'a, f32> {
        self.right
    }

    /// The per-sample shape of the images.
    pub fn shape(&self) -> DatasetShape {
        let (_, height, width, channels) = self.left.dim();
        DatasetShape::new(height, width, channels)
    }

    /// Gathers the samples at `indexes` into owned tensors.
    pub fn select(&self, indexes: &[usize]) -> (Array4<f32>, Array4<f32>) {
        (
            self.left.select(Axis(0), indexes),
            self.right.select(Axis(0), indexes),
        )
    }
}

/// The order in which the samples of a training tensor are visited during an epoch.
#[derive(Debug, Clone)]
pub struct SampleOrder {
    order: Vec<usize>,
}

impl SampleOrder {
    /// Creates the identity order over `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
        }
    }

    /// Shuffles the visiting order in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
    }

    /// Splits the current order into batches of at most `batch_size` sample indexes.
    pub fn batches(&self, batch_size: NonZeroUsize) -> impl Iterator<Item = &[usize]> {
        self.order.chunks(batch_size.get())
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn stereo_view_rejects_unpaired_images() {
        let left = Array4::<f32>::zeros((2, 3, 4, 1));
        let right = Array4::<f32>::zeros((2, 3, 5, 1));

        let err = StereoView::new(left.view(), right.view()).unwrap_err();
        assert!(matches!(err, MlErr::ShapeMismatch { .. }));
    }

    #[test]
    fn stereo_view_selects_samples_in_requested_order() {
        let left = Array4::from_shape_fn((3, 1, 1, 1), |(n, ..)| n as f32);
        let right = Array4::from_shape_fn((3, 1, 1, 1), |(n, ..)| 10.0 + n as f32);
        let view = StereoView::new(left.view(), right.view()).unwrap();

        let (l, r) = view.select(&[2, 0]);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![2.0, 0.0]);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), vec![12.0, 10.0]);
        assert_eq!(view.shape(), DatasetShape::new(1, 1, 1));
    }

    #[test]
    fn sample_order_batches_cover_every_sample_once() {
        let mut order = SampleOrder::new(7);
        order.shuffle(&mut StdRng::seed_from_u64(3));

        let batches: Vec<_> = order.batches(NonZeroUsize::new(3).unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);

        let mut seen: Vec<usize> = batches.concat();
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }
}
