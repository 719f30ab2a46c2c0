use std::num::NonZeroUsize;

use machine_learning::arch::{LossSpec, OptimizerSpec, PixelNetSpec};
use serde::{Deserialize, Serialize};

use crate::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnConfig {
    #[default]
    Mse,
    Mae,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    GradientDescent {
        lr: f32,
    },
    Adam {
        lr: f32,
        #[serde(default = "default_b1")]
        b1: f32,
        #[serde(default = "default_b2")]
        b2: f32,
        #[serde(default = "default_eps")]
        eps: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            lr: 1e-3,
            b1: default_b1(),
            b2: default_b2(),
            eps: default_eps(),
        }
    }
}

fn default_b1() -> f32 {
    0.9
}

fn default_b2() -> f32 {
    0.999
}

fn default_eps() -> f32 {
    1e-8
}

/// The reference disparity model's hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Width of the hidden layer.
    pub hidden: NonZeroUsize,
    /// How many horizontal shifts the matching cost compares.
    pub max_shift: usize,
    /// The raw intensity that maps to 1.0.
    pub input_scale: f32,
    pub loss: LossFnConfig,
    pub optimizer: OptimizerConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            max_shift: 16,
            input_scale: 255.0,
            loss: LossFnConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_shift == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "model.max_shift must be at least 1".into(),
            ));
        }

        if !(self.input_scale.is_finite() && self.input_scale > 0.0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "model.input_scale must be positive, got {}",
                self.input_scale
            )));
        }

        let lr = match self.optimizer {
            OptimizerConfig::GradientDescent { lr } => lr,
            OptimizerConfig::Adam { lr, b1, b2, .. } => {
                if !((0.0..1.0).contains(&b1) && (0.0..1.0).contains(&b2)) {
                    return Err(OrchestratorError::InvalidConfig(format!(
                        "adam betas must lie in [0, 1), got {b1} and {b2}"
                    )));
                }
                lr
            }
        };

        if !(lr.is_finite() && lr > 0.0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "learning rate must be positive, got {lr}"
            )));
        }

        Ok(())
    }

    /// Converts this config into the factory that builds the model.
    ///
    /// # Arguments
    /// * `seed` - Seeds weight initialization and sample shuffling, random if `None`.
    pub fn to_spec(&self, seed: Option<u64>) -> PixelNetSpec {
        let optimizer = match self.optimizer {
            OptimizerConfig::GradientDescent { lr } => OptimizerSpec::GradientDescent { lr },
            OptimizerConfig::Adam { lr, b1, b2, eps } => OptimizerSpec::Adam { lr, b1, b2, eps },
        };

        let loss = match self.loss {
            LossFnConfig::Mse => LossSpec::Mse,
            LossFnConfig::Mae => LossSpec::Mae,
        };

        PixelNetSpec {
            hidden: self.hidden,
            max_shift: self.max_shift,
            input_scale: self.input_scale,
            loss,
            optimizer,
            seed,
        }
    }
}
