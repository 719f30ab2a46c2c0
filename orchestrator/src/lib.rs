pub mod checkpoint;
pub mod configs;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod history;
mod predictor;
mod report;
pub mod schedule;
mod scheduler;

use std::path::Path;

use machine_learning::arch::PixelNetSpec;

use configs::{DatasetConfig, TrainingConfig};
use data::NpzShardStore;

pub use error::{OrchestratorError, Result};
pub use predictor::{Phase, Predictor};
pub use report::{InferenceReport, PassReport, RunReport};

/// A predictor over `.npz` shard files training the reference model.
pub type NpzPredictor = Predictor<NpzShardStore, PixelNetSpec>;

/// Builds a predictor reading `dataset` from `training.data_dir`.
///
/// # Errors
/// Returns an `OrchestratorError` if the config is invalid.
pub fn predictor(dataset: DatasetConfig, training: TrainingConfig) -> Result<NpzPredictor> {
    let store = NpzShardStore::new(&training.data_dir, &dataset);
    let factory = training.model.to_spec(training.seed);
    Predictor::new(dataset, training, store, factory)
}

/// Runs the whole training schedule over a dataset of `.npz` shards.
///
/// # Errors
/// Returns the first `OrchestratorError` of the run, checkpoints written until then survive.
pub fn train(dataset: DatasetConfig, training: TrainingConfig) -> Result<RunReport> {
    log::info!(
        "training on dataset '{}' with {} shard(s), schedule {}",
        dataset.name,
        dataset.shard_count,
        training.schedule
    );
    predictor(dataset, training)?.train()
}

/// Evaluates pretrained weights over a dataset of `.npz` shards.
///
/// # Errors
/// Returns an `OrchestratorError` if the weights or any shard can't be loaded.
pub fn evaluate(
    dataset: DatasetConfig,
    training: TrainingConfig,
    weights: &Path,
) -> Result<InferenceReport> {
    log::info!(
        "evaluating {} on dataset '{}'",
        weights.display(),
        dataset.name
    );
    predictor(dataset, training)?.evaluate_pretrained(weights)
}
