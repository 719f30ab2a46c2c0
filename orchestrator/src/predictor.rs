use std::path::Path;

use log::info;
use machine_learning::{DatasetShape, arch::ModelFactory};

use crate::{
    OrchestratorError, Result,
    checkpoint::{self, CheckpointWriter},
    configs::{DatasetConfig, TrainingConfig},
    data::{DisparityRange, ShardId, ShardStore, compute_range},
    evaluation::EvaluationEngine,
    history::EpeHistory,
    report::{InferenceReport, PassReport, RunReport},
    scheduler::{Prepared, TrainingScheduler},
};

/// Where a `Predictor` is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has been loaded yet.
    Idle,
    /// The global disparity range is known.
    RangeComputed,
    /// The test split is normalized and resident.
    TestLoaded,
    /// A training pass is running, or failed.
    Training { pass: usize },
    Done,
}

/// Drives a whole run over one dataset: the disparity range pre-pass, the test split load, the
/// epoch schedule and the evaluations after every pass.
///
/// Owns the normalization state, the test split, the single resident training shard and the
/// model, none of which is shared.
pub struct Predictor<S, F: ModelFactory> {
    dataset: DatasetConfig,
    training: TrainingConfig,
    phase: Phase,
    prepared: Option<Prepared>,
    scheduler: TrainingScheduler<S, F>,
}

impl<S: ShardStore, F: ModelFactory> Predictor<S, F> {
    /// Creates a new `Predictor` without touching the store.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to train on.
    /// * `training` - How to train, checkpoint and report.
    /// * `store` - Where the shards of `dataset` are loaded from.
    /// * `factory` - Builds the model once the dataset shape is known.
    ///
    /// # Errors
    /// `InvalidConfig` if `training` is invalid or `store` serves another dataset.
    pub fn new(
        dataset: DatasetConfig,
        training: TrainingConfig,
        store: S,
        factory: F,
    ) -> Result<Self> {
        training.validate()?;

        if store.dataset() != dataset.name {
            return Err(OrchestratorError::InvalidConfig(format!(
                "the shard store serves dataset '{}', not '{}'",
                store.dataset(),
                dataset.name
            )));
        }

        let scheduler = TrainingScheduler::new(
            store,
            factory,
            dataset.shard_count,
            training.batch_size,
            training.shuffle,
            EvaluationEngine::new(training.timing_sample),
            training.epe_log.as_ref().map(EpeHistory::new),
        );

        Ok(Self {
            dataset,
            training,
            phase: Phase::Idle,
            prepared: None,
            scheduler,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The global disparity range, once computed.
    pub fn range(&self) -> Option<DisparityRange> {
        self.prepared.as_ref().map(|p| p.range)
    }

    /// The resolved dataset shape, once the test split is loaded.
    pub fn shape(&self) -> Option<DatasetShape> {
        self.prepared.as_ref().map(|p| p.shape)
    }

    /// The model, once built.
    pub fn model(&self) -> Option<&F::Model> {
        self.scheduler.model()
    }

    pub fn store(&self) -> &S {
        &self.scheduler.store
    }

    /// Computes the global disparity range and loads the test split.
    ///
    /// Does nothing unless the predictor is `Idle`.
    ///
    /// # Errors
    /// Any shard that can't be loaded, or a degenerate range, aborts before training starts.
    pub fn prepare(&mut self) -> Result<()> {
        if self.phase != Phase::Idle {
            return Ok(());
        }

        let store = &mut self.scheduler.store;
        let scan = compute_range(store, self.dataset.shard_count)?;
        enter(&mut self.phase, Phase::RangeComputed);

        let test = store.load_shard(ShardId::Test)?;
        let (height, width) = scan.spatial;
        let shape = DatasetShape::new(height, width, test.shape().channels);
        test.check_shape(&self.dataset.name, shape)?;
        info!(
            "dataset '{}': {} test samples of {height}x{width}x{}",
            self.dataset.name,
            test.len(),
            shape.channels
        );

        self.prepared = Some(Prepared {
            range: scan.range,
            shape,
            test: test.normalize(&scan.range),
        });
        enter(&mut self.phase, Phase::TestLoaded);

        Ok(())
    }

    /// Runs the whole epoch schedule: every pass fits every training shard in ascending order,
    /// then evaluates the train and test splits.
    ///
    /// # Errors
    /// The first failure aborts the run. The checkpoints written so far stay on disk.
    pub fn train(&mut self) -> Result<RunReport> {
        self.prepare()?;
        let prepared = ready(self.phase, self.prepared.as_ref())?;

        let mut checkpoints = CheckpointWriter::create(
            &self.training.checkpoint_dir,
            self.training.checkpoint_naming,
            &self.dataset.name,
        )?;

        let schedule = &self.training.schedule;
        let mut passes = Vec::with_capacity(schedule.len());

        for (i, epochs) in schedule.iter().enumerate() {
            let pass = i + 1;
            enter(&mut self.phase, Phase::Training { pass });
            info!(
                "pass {pass}/{}: {epochs} epoch(s) on each of {} shard(s)",
                schedule.len(),
                self.dataset.shard_count
            );

            let shards = self
                .scheduler
                .train_pass(pass, epochs, prepared, &mut checkpoints)?;
            let (train, test) = self.scheduler.evaluate_pass(pass, epochs, prepared)?;

            passes.push(PassReport {
                pass,
                epochs,
                shards,
                train,
                test,
            });
        }

        self.scheduler.resident.release();
        enter(&mut self.phase, Phase::Done);

        Ok(RunReport {
            passes,
            checkpoints: checkpoints.written().to_vec(),
        })
    }

    /// Evaluates pretrained weights instead of training.
    ///
    /// # Errors
    /// `Checkpoint` if the weights file is invalid, `Model` if it doesn't fit the model.
    pub fn evaluate_pretrained(&mut self, weights: &Path) -> Result<InferenceReport> {
        let tensors = checkpoint::load_weights(weights)?;

        self.prepare()?;
        let prepared = ready(self.phase, self.prepared.as_ref())?;

        let report = self.scheduler.evaluate_pretrained(prepared, &tensors)?;
        enter(&mut self.phase, Phase::Done);

        Ok(report)
    }
}

fn ready(phase: Phase, prepared: Option<&Prepared>) -> Result<&Prepared> {
    match (phase, prepared) {
        (Phase::TestLoaded, Some(prepared)) => Ok(prepared),
        (phase, _) => Err(OrchestratorError::InvalidState(format!(
            "a run can only start once the test split is loaded, the predictor is {phase:?}"
        ))),
    }
}

fn enter(phase: &mut Phase, next: Phase) {
    info!("{phase:?} -> {next:?}");
    *phase = next;
}
