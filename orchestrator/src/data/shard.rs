use std::fmt;

use log::debug;
use machine_learning::{DatasetShape, StereoView};
use ndarray::{Array4, ArrayView4, Axis};

use super::{DisparityRange, ShardStore};
use crate::{OrchestratorError, Result};

/// Identifies a shard of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardId {
    /// A training shard, indexed from 1.
    Train(usize),
    /// The single fixed test split.
    Test,
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardId::Train(index) => write!(f, "train shard {index}"),
            ShardId::Test => write!(f, "test split"),
        }
    }
}

/// An aligned triple of left images, right images and raw disparity.
#[derive(Debug, Clone)]
pub struct Shard {
    id: ShardId,
    left: Array4<f32>,
    right: Array4<f32>,
    disparity: Array4<f32>,
}

impl Shard {
    /// Creates a new `Shard`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset name, only used as error context.
    /// * `id` - Which shard of the dataset this is.
    /// * `left` - The `[N,H,W,C]` left images.
    /// * `right` - The `[N,H,W,C]` right images.
    /// * `disparity` - The `[N,H,W,1]` raw disparity.
    ///
    /// # Errors
    /// `EmptySplit` if there are no samples, `ShapeMismatch` if the tensors disagree.
    pub fn new(
        dataset: &str,
        id: ShardId,
        left: Array4<f32>,
        right: Array4<f32>,
        disparity: Array4<f32>,
    ) -> Result<Self> {
        let mismatch = |what: &'static str, got: &[usize], expected: &[usize]| {
            OrchestratorError::ShapeMismatch {
                dataset: dataset.to_string(),
                shard: id,
                what,
                got: got.to_vec(),
                expected: expected.to_vec(),
            }
        };

        if right.shape() != left.shape() {
            return Err(mismatch("right images", right.shape(), left.shape()));
        }

        let (n, h, w, _) = left.dim();
        let expected = [n, h, w, 1];
        if disparity.shape() != expected {
            return Err(mismatch("disparity", disparity.shape(), &expected));
        }

        if n == 0 {
            return Err(OrchestratorError::EmptySplit {
                dataset: dataset.to_string(),
                shard: id,
            });
        }

        Ok(Self {
            id,
            left,
            right,
            disparity,
        })
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    /// The amount of samples in the shard.
    pub fn len(&self) -> usize {
        self.left.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The per-sample shape of this shard.
    pub fn shape(&self) -> DatasetShape {
        let (_, height, width, channels) = self.left.dim();
        DatasetShape::new(height, width, channels)
    }

    pub fn disparity(&self) -> ArrayView4<'_, f32> {
        self.disparity.view()
    }

    /// Checks this shard against the shape resolved for its dataset.
    ///
    /// # Errors
    /// `ShapeMismatch` if the images differ in height, width or channels.
    pub fn check_shape(&self, dataset: &str, shape: DatasetShape) -> Result<()> {
        if self.shape() == shape {
            return Ok(());
        }

        Err(OrchestratorError::ShapeMismatch {
            dataset: dataset.to_string(),
            shard: self.id,
            what: "images",
            got: self.left.shape().to_vec(),
            expected: shape.image_dims(self.len()).to_vec(),
        })
    }

    /// Rescales the raw disparity into `[0, 1]`, consuming the raw tensor.
    pub fn normalize(mut self, range: &DisparityRange) -> NormalizedShard {
        range.normalize(&mut self.disparity);
        NormalizedShard(self)
    }
}

/// A shard whose disparity has been divided by the global maximum disparity.
#[derive(Debug, Clone)]
pub struct NormalizedShard(Shard);

impl NormalizedShard {
    pub fn id(&self) -> ShardId {
        self.0.id
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shape(&self) -> DatasetShape {
        self.0.shape()
    }

    /// The paired left and right images.
    pub fn inputs(&self) -> machine_learning::Result<StereoView<'_>> {
        StereoView::new(self.0.left.view(), self.0.right.view())
    }

    /// The normalized `[N,H,W,1]` disparity targets.
    pub fn targets(&self) -> ArrayView4<'_, f32> {
        self.0.disparity.view()
    }

    /// The images and normalized disparity of sample `i`, each with a batch size of 1.
    pub fn sample(
        &self,
        i: usize,
    ) -> machine_learning::Result<(StereoView<'_>, ArrayView4<'_, f32>)> {
        let inputs = StereoView::new(single(&self.0.left, i), single(&self.0.right, i))?;
        Ok((inputs, single(&self.0.disparity, i)))
    }
}

fn single(tensor: &Array4<f32>, i: usize) -> ArrayView4<'_, f32> {
    tensor.slice_axis(Axis(0), (i..i + 1).into())
}

/// The one training shard allowed in memory at a time.
///
/// Loading the next shard always drops the current one first, so peak memory is bounded by the
/// largest shard rather than by the sum of two.
#[derive(Debug, Default)]
pub struct ResidentShard {
    current: Option<NormalizedShard>,
}

impl ResidentShard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases the current shard and loads, validates and normalizes training shard `index`.
    ///
    /// If loading fails, nothing is resident afterwards.
    pub fn load<S: ShardStore + ?Sized>(
        &mut self,
        store: &mut S,
        index: usize,
        shape: DatasetShape,
        range: &DisparityRange,
    ) -> Result<&NormalizedShard> {
        self.release();

        let shard = store.load_shard(ShardId::Train(index))?;
        shard.check_shape(store.dataset(), shape)?;
        debug!("{} resident with {} samples", shard.id(), shard.len());

        Ok(self.current.insert(shard.normalize(range)))
    }

    /// Drops the current shard, if any.
    pub fn release(&mut self) {
        if let Some(shard) = self.current.take() {
            debug!("releasing {}", shard.id());
        }
    }

    pub fn get(&self) -> Option<&NormalizedShard> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensors(n: usize, h: usize, w: usize) -> (Array4<f32>, Array4<f32>, Array4<f32>) {
        (
            Array4::zeros((n, h, w, 3)),
            Array4::ones((n, h, w, 3)),
            Array4::from_elem((n, h, w, 1), 4.0),
        )
    }

    #[test]
    fn rejects_disparity_with_another_sample_count() {
        let (left, right, _) = tensors(3, 2, 2);
        let disparity = Array4::zeros((2, 2, 2, 1));

        let err = Shard::new("toy", ShardId::Train(1), left, right, disparity).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ShapeMismatch { what: "disparity", shard: ShardId::Train(1), .. }
        ));
    }

    #[test]
    fn rejects_unpaired_images() {
        let (left, _, disparity) = tensors(1, 2, 2);
        let right = Array4::zeros((1, 2, 2, 1));

        let err = Shard::new("toy", ShardId::Test, left, right, disparity).unwrap_err();
        assert!(matches!(err, OrchestratorError::ShapeMismatch { what: "right images", .. }));
    }

    #[test]
    fn rejects_empty_shards() {
        let (left, right, disparity) = tensors(0, 2, 2);
        let err = Shard::new("toy", ShardId::Test, left, right, disparity).unwrap_err();
        assert!(matches!(err, OrchestratorError::EmptySplit { .. }));
    }

    #[test]
    fn check_shape_catches_other_resolutions() {
        let (left, right, disparity) = tensors(1, 2, 2);
        let shard = Shard::new("toy", ShardId::Train(2), left, right, disparity).unwrap();

        assert!(shard.check_shape("toy", DatasetShape::new(2, 2, 3)).is_ok());
        let err = shard
            .check_shape("toy", DatasetShape::new(2, 2, 1))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ShapeMismatch { what: "images", .. }));
    }

    #[test]
    fn normalized_samples_are_single_item_batches() {
        let (left, right, disparity) = tensors(3, 2, 2);
        let shard = Shard::new("toy", ShardId::Test, left, right, disparity)
            .unwrap()
            .normalize(&DisparityRange::new(8.0, 0.0));

        let (inputs, truth) = shard.sample(2).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(truth.shape(), &[1, 2, 2, 1]);
        assert!(truth.iter().all(|&d| d == 0.5));
        assert_eq!(shard.inputs().unwrap().len(), 3);
    }
}
