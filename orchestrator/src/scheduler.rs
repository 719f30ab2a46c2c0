use std::num::NonZeroUsize;

use log::info;
use machine_learning::{
    DatasetShape,
    arch::{DisparityModel, FitOptions, ModelFactory, NamedTensor},
};

use crate::{
    OrchestratorError, Result,
    checkpoint::CheckpointWriter,
    data::{DisparityRange, NormalizedShard, ResidentShard, ShardStore},
    evaluation::{EpeResult, EvaluationEngine, Split},
    history::EpeHistory,
    report::InferenceReport,
};

/// What the range pre-pass and the test split load resolve before any training.
#[derive(Debug)]
pub(crate) struct Prepared {
    pub range: DisparityRange,
    pub shape: DatasetShape,
    pub test: NormalizedShard,
}

/// Sweeps the training shards in order, fitting a single lazily built model on each of them.
pub(crate) struct TrainingScheduler<S, F: ModelFactory> {
    pub store: S,
    factory: F,
    model: Option<F::Model>,
    pub resident: ResidentShard,
    shard_count: NonZeroUsize,
    batch_size: NonZeroUsize,
    shuffle: bool,
    evaluator: EvaluationEngine,
    history: Option<EpeHistory>,
}

impl<S: ShardStore, F: ModelFactory> TrainingScheduler<S, F> {
    pub fn new(
        store: S,
        factory: F,
        shard_count: NonZeroUsize,
        batch_size: NonZeroUsize,
        shuffle: bool,
        evaluator: EvaluationEngine,
        history: Option<EpeHistory>,
    ) -> Self {
        Self {
            store,
            factory,
            model: None,
            resident: ResidentShard::new(),
            shard_count,
            batch_size,
            shuffle,
            evaluator,
            history,
        }
    }

    pub fn model(&self) -> Option<&F::Model> {
        self.model.as_ref()
    }

    /// Fits every training shard, `1..=shard_count`, for `epochs` epochs each.
    ///
    /// # Returns
    /// The visited shard indices. The last of them stays resident for evaluation.
    pub fn train_pass(
        &mut self,
        pass: usize,
        epochs: usize,
        prepared: &Prepared,
        checkpoints: &mut CheckpointWriter,
    ) -> Result<Vec<usize>> {
        let dataset = self.store.dataset().to_string();
        let options = FitOptions {
            epochs,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
        };

        let mut visited = Vec::with_capacity(self.shard_count.get());
        for index in 1..=self.shard_count.get() {
            let shard = self
                .resident
                .load(&mut self.store, index, prepared.shape, &prepared.range)?;
            let model = build_once(&mut self.model, &self.factory, prepared.shape)?;

            checkpoints.begin_fit(pass, index);
            let fitted = shard
                .inputs()
                .and_then(|inputs| model.fit(inputs, shard.targets(), &options, checkpoints));

            let report = match fitted {
                Ok(report) => report,
                Err(source) => {
                    self.resident.release();
                    return Err(OrchestratorError::Fit {
                        dataset,
                        pass,
                        shard: index,
                        source,
                    });
                }
            };

            info!(
                "pass {pass}: fitted train shard {index} ({} samples), final loss {:.6}",
                shard.len(),
                report.final_loss().unwrap_or(f32::NAN)
            );
            visited.push(index);
        }

        Ok(visited)
    }

    /// Evaluates the model on the resident training shard and on the test split.
    pub fn evaluate_pass(
        &mut self,
        pass: usize,
        epochs: usize,
        prepared: &Prepared,
    ) -> Result<(EpeResult, EpeResult)> {
        let (Some(model), Some(shard)) = (self.model.as_mut(), self.resident.get()) else {
            return Err(OrchestratorError::InvalidState(format!(
                "pass {pass} has no fitted model or resident shard to evaluate"
            )));
        };

        let dataset = self.store.dataset();
        let range = &prepared.range;

        let train = self.evaluator.evaluate(dataset, shard, range, model)?;
        record(self.history.as_ref(), Some((pass, epochs)), &train, range)?;

        let test = self
            .evaluator
            .evaluate(dataset, &prepared.test, range, model)?;
        record(self.history.as_ref(), Some((pass, epochs)), &test, range)?;

        Ok((train, test))
    }

    /// Loads `weights` into a freshly built model and evaluates it on the test split and on
    /// every training shard.
    pub fn evaluate_pretrained(
        &mut self,
        prepared: &Prepared,
        weights: &[NamedTensor],
    ) -> Result<InferenceReport> {
        let model = build_once(&mut self.model, &self.factory, prepared.shape)?;
        model.load_weights(weights)?;

        let dataset = self.store.dataset().to_string();
        let range = &prepared.range;

        let test = self
            .evaluator
            .evaluate(&dataset, &prepared.test, range, model)?;
        record(self.history.as_ref(), None, &test, range)?;

        let mut shards = Vec::with_capacity(self.shard_count.get());
        for index in 1..=self.shard_count.get() {
            let shard = self
                .resident
                .load(&mut self.store, index, prepared.shape, range)?;
            shards.push(self.evaluator.evaluate(&dataset, shard, range, model)?);
        }
        self.resident.release();

        let train = EpeResult::merge(Split::Train, &shards, range).ok_or_else(|| {
            OrchestratorError::InvalidState("no training samples were evaluated".into())
        })?;
        record(self.history.as_ref(), None, &train, range)?;

        Ok(InferenceReport { train, test })
    }
}

/// Builds the model on first use, every later call returns the same instance.
fn build_once<'a, F: ModelFactory>(
    slot: &'a mut Option<F::Model>,
    factory: &F,
    shape: DatasetShape,
) -> Result<&'a mut F::Model> {
    let model = match slot.take() {
        Some(model) => model,
        None => {
            info!(
                "building model for {}x{}x{} samples",
                shape.height, shape.width, shape.channels
            );
            factory.build(shape)?
        }
    };

    Ok(slot.insert(model))
}

fn record(
    history: Option<&EpeHistory>,
    pass: Option<(usize, usize)>,
    result: &EpeResult,
    range: &DisparityRange,
) -> Result<()> {
    match pass {
        Some((pass, epochs)) => info!("pass {pass} ({epochs} epochs): {result}"),
        None => info!("pretrained weights: {result}"),
    }

    if let Some(history) = history {
        let (pass, epochs) = pass.unzip();
        history.append(pass, epochs, result, range)?;
    }

    Ok(())
}
