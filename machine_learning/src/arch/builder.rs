use std::num::NonZeroUsize;

use log::debug;
use rand::{SeedableRng, rngs::StdRng};

use super::{
    ModelFactory, PixelNet,
    activations::ActFn,
    features::MatchingCost,
    layers::Dense,
    loss::{LossFn, Mae, Mse},
};
use crate::{
    MlErr, Result,
    dataset::DatasetShape,
    optimization::{Adam, GradientDescent, Optimizer},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerSpec {
    GradientDescent { lr: f32 },
    Adam { lr: f32, b1: f32, b2: f32, eps: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossSpec {
    Mse,
    Mae,
}

/// Everything needed to build a `PixelNet` once the dataset shape is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelNetSpec {
    pub hidden: NonZeroUsize,
    pub max_shift: usize,
    pub input_scale: f32,
    pub loss: LossSpec,
    pub optimizer: OptimizerSpec,
    pub seed: Option<u64>,
}

impl Default for PixelNetSpec {
    fn default() -> Self {
        Self {
            hidden: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            max_shift: 16,
            input_scale: 255.0,
            loss: LossSpec::Mse,
            optimizer: OptimizerSpec::Adam {
                lr: 1e-3,
                b1: 0.9,
                b2: 0.999,
                eps: 1e-8,
            },
            seed: None,
        }
    }
}

impl ModelFactory for PixelNetSpec {
    type Model = PixelNet;

    fn build(&self, shape: DatasetShape) -> Result<PixelNet> {
        if shape.channels == 0 || shape.pixels() == 0 {
            return Err(MlErr::ShapeMismatch {
                what: "dataset shape",
                got: vec![shape.height, shape.width, shape.channels],
                expected: vec![1, 1, 1],
            });
        }

        let features = MatchingCost::new(self.max_shift, self.input_scale)?;
        let mut rng = self.generate_rng();

        let hidden = Dense::new(
            (features.width(), self.hidden.get()),
            Some(ActFn::relu()),
            &mut rng,
        )?;
        let output = Dense::new((self.hidden.get(), 1), Some(ActFn::sigmoid(1.)), &mut rng)?;

        let sizes = [
            features.width() * self.hidden.get(),
            self.hidden.get(),
            self.hidden.get(),
            1,
        ];
        let optimizers = sizes
            .into_iter()
            .map(|len| self.resolve_optimizer(len))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "built pixel net for {}x{}x{}: {} features, {} hidden units, {} params",
            shape.height,
            shape.width,
            shape.channels,
            features.width(),
            self.hidden,
            hidden.size() + output.size()
        );

        Ok(PixelNet::new(
            shape,
            features,
            hidden,
            output,
            self.resolve_loss(),
            optimizers,
            rng,
        ))
    }
}

impl PixelNetSpec {
    fn resolve_optimizer(&self, len: usize) -> Result<Box<dyn Optimizer + Send>> {
        match self.optimizer {
            OptimizerSpec::GradientDescent { lr } => {
                Self::check_lr(lr)?;
                Ok(Box::new(GradientDescent::new(lr)))
            }
            OptimizerSpec::Adam { lr, b1, b2, eps } => {
                Self::check_lr(lr)?;
                if !((0.0..1.0).contains(&b1) && (0.0..1.0).contains(&b2)) {
                    return Err(MlErr::InvalidHyperparameter {
                        name: "adam betas",
                        reason: format!("must lie in [0, 1), got {b1} and {b2}"),
                    });
                }
                Ok(Box::new(Adam::new(len, lr, b1, b2, eps)))
            }
        }
    }

    fn resolve_loss(&self) -> Box<dyn LossFn + Send> {
        match self.loss {
            LossSpec::Mse => Box::new(Mse::new()),
            LossSpec::Mae => Box::new(Mae::new()),
        }
    }

    fn check_lr(lr: f32) -> Result<()> {
        if lr.is_finite() && lr > 0.0 {
            Ok(())
        } else {
            Err(MlErr::InvalidHyperparameter {
                name: "learning rate",
                reason: format!("must be a positive number, got {lr}"),
            })
        }
    }

    fn generate_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
