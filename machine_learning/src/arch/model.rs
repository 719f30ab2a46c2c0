use std::{io, num::NonZeroUsize};

use ndarray::{Array4, ArrayView4};

use crate::{
    Result,
    dataset::{DatasetShape, StereoView},
};

/// A flat `f32` tensor identified by name, the unit in which weights are exchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            data,
        }
    }
}

/// How a single `fit` call iterates its data.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    pub shuffle: bool,
}

/// The per-epoch losses of a `fit` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitReport {
    losses: Vec<f32>,
}

impl FitReport {
    pub fn new(losses: Vec<f32>) -> Self {
        Self { losses }
    }

    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    /// The loss of the last completed epoch, if any.
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

/// Observes a `fit` call, once after every completed epoch.
pub trait EpochCallback {
    /// # Arguments
    /// * `epoch` - The 1-based index of the epoch within the current `fit` call.
    /// * `loss` - The epoch loss.
    /// * `weights` - A snapshot of the model weights after the epoch.
    fn on_epoch_end(&mut self, epoch: usize, loss: f32, weights: &[NamedTensor]) -> io::Result<()>;
}

/// An `EpochCallback` that ignores every epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallback;

impl EpochCallback for NoCallback {
    fn on_epoch_end(&mut self, _: usize, _: f32, _: &[NamedTensor]) -> io::Result<()> {
        Ok(())
    }
}

/// A trainable stereo disparity model.
///
/// Inputs are `[N,H,W,C]` image pairs; targets and predictions are `[N,H,W,1]` normalized
/// disparity maps. The model owns its learned weights, callers only ever see snapshots.
pub trait DisparityModel {
    /// Trains the model for `options.epochs` epochs over the given samples.
    ///
    /// # Arguments
    /// * `inputs` - The left and right images.
    /// * `targets` - The normalized ground truth disparity of every sample.
    /// * `options` - Epochs, batch size and whether to shuffle samples within each epoch.
    /// * `callback` - Invoked after every epoch with the updated weights.
    ///
    /// # Returns
    /// The per-epoch losses or an error if the tensors are malformed or the callback fails.
    fn fit(
        &mut self,
        inputs: StereoView<'_>,
        targets: ArrayView4<'_, f32>,
        options: &FitOptions,
        callback: &mut dyn EpochCallback,
    ) -> Result<FitReport>;

    /// Predicts the normalized disparity of every sample in `inputs`.
    fn predict(&mut self, inputs: StereoView<'_>) -> Result<Array4<f32>>;

    /// Returns a snapshot of the current weights.
    fn weights(&self) -> Vec<NamedTensor>;

    /// Replaces the current weights with `tensors`.
    ///
    /// # Errors
    /// Returns an error if a tensor is unknown to the model or has the wrong shape.
    fn load_weights(&mut self, tensors: &[NamedTensor]) -> Result<()>;
}

/// Builds models for a dataset once its shape is known.
pub trait ModelFactory {
    type Model: DisparityModel;

    fn build(&self, shape: DatasetShape) -> Result<Self::Model>;
}
