use std::path::PathBuf;

use serde::Serialize;

use crate::evaluation::EpeResult;

/// What a single training pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    /// 1-based.
    pub pass: usize,
    /// Epochs spent on every shard.
    pub epochs: usize,
    /// The training shards fitted, in visiting order.
    pub shards: Vec<usize>,
    pub train: EpeResult,
    pub test: EpeResult,
}

/// The outcome of a full training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub passes: Vec<PassReport>,
    /// Every checkpoint written, in order.
    pub checkpoints: Vec<PathBuf>,
}

impl RunReport {
    /// The report of the last pass, which holds the final EPE of the run.
    pub fn last(&self) -> Option<&PassReport> {
        self.passes.last()
    }

    /// The amount of EPE evaluations performed over the whole run.
    pub fn evaluations(&self) -> usize {
        self.passes.len() * 2
    }
}

/// The outcome of evaluating pretrained weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceReport {
    /// Sample-weighted over every training shard.
    pub train: EpeResult,
    pub test: EpeResult,
}
