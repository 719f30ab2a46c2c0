use std::{fmt, time::Instant};

use log::{debug, info};
use machine_learning::{MlErr, arch::DisparityModel};
use ndarray::ArrayView4;
use serde::Serialize;

use crate::{
    OrchestratorError, Result,
    data::{DisparityRange, NormalizedShard, ShardId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl From<ShardId> for Split {
    fn from(id: ShardId) -> Self {
        match id {
            ShardId::Train(_) => Split::Train,
            ShardId::Test => Split::Test,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// The End-Point-Error of a split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpeResult {
    pub split: Split,
    pub samples: usize,
    /// Mean absolute error in normalized disparity units.
    pub epe: f64,
    /// `epe` converted back to pixels.
    pub pixel_epe: f64,
}

impl EpeResult {
    /// Combines results over disjoint parts of a split into their sample-weighted mean.
    ///
    /// # Returns
    /// `None` if there are no samples to average.
    pub fn merge(split: Split, results: &[EpeResult], range: &DisparityRange) -> Option<Self> {
        let samples: usize = results.iter().map(|r| r.samples).sum();
        if samples == 0 {
            return None;
        }

        let weighted: f64 = results.iter().map(|r| r.epe * r.samples as f64).sum();
        let epe = weighted / samples as f64;

        Some(Self {
            split,
            samples,
            epe,
            pixel_epe: range.to_pixels(epe),
        })
    }
}

impl fmt::Display for EpeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} EPE over {} samples: {:.6} ({:.4} px)",
            self.split, self.samples, self.epe, self.pixel_epe
        )
    }
}

/// Measures the EPE of a model, one sample at a time.
///
/// Predicting a single sample per call keeps peak memory bounded by one sample's activations
/// and lets the latency of one chosen sample be measured in isolation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationEngine {
    timing_sample: usize,
}

impl EvaluationEngine {
    /// # Arguments
    /// * `timing_sample` - The index of the sample whose prediction latency gets logged.
    pub fn new(timing_sample: usize) -> Self {
        Self { timing_sample }
    }

    /// Computes the EPE of `model` over every sample of `shard`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset name, only used as error context.
    /// * `shard` - A normalized split.
    /// * `range` - The range `shard` was normalized with.
    /// * `model` - The model to evaluate.
    ///
    /// # Errors
    /// `Predict` if the model fails or predicts a map of the wrong shape.
    pub fn evaluate<M: DisparityModel + ?Sized>(
        &self,
        dataset: &str,
        shard: &NormalizedShard,
        range: &DisparityRange,
        model: &mut M,
    ) -> Result<EpeResult> {
        let failed = |source: MlErr| OrchestratorError::Predict {
            dataset: dataset.to_string(),
            shard: shard.id(),
            source,
        };

        let mut total = 0.0;
        for i in 0..shard.len() {
            let (inputs, truth) = shard.sample(i).map_err(failed)?;

            let start = (i == self.timing_sample).then(Instant::now);
            let predicted = model.predict(inputs).map_err(failed)?;
            if let Some(start) = start {
                info!("{}: predicting sample {i} took {:?}", shard.id(), start.elapsed());
            }

            if predicted.shape() != truth.shape() {
                return Err(failed(MlErr::ShapeMismatch {
                    what: "predicted disparity",
                    got: predicted.shape().to_vec(),
                    expected: truth.shape().to_vec(),
                }));
            }

            total += sample_epe(predicted.view(), truth);
        }

        let samples = shard.len();
        let epe = if samples == 0 { 0.0 } else { total / samples as f64 };
        let result = EpeResult {
            split: shard.id().into(),
            samples,
            epe,
            pixel_epe: range.to_pixels(epe),
        };

        debug!("{}: {result}", shard.id());
        Ok(result)
    }
}

/// The mean absolute difference over every pixel of a single sample.
fn sample_epe(predicted: ArrayView4<f32>, truth: ArrayView4<f32>) -> f64 {
    let pixels = truth.len();
    if pixels == 0 {
        return 0.0;
    }

    let error: f64 = predicted
        .iter()
        .zip(truth.iter())
        .map(|(&p, &t)| (p as f64 - t as f64).abs())
        .sum();

    error / pixels as f64
}
