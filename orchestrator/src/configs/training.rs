use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use super::ModelConfig;
use crate::{OrchestratorError, Result, checkpoint::CheckpointNaming, schedule::EpochSchedule};

/// How a run trains, checkpoints and reports.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Where the dataset files are read from.
    pub data_dir: PathBuf,
    /// The run's checkpoint directory, must not exist yet.
    pub checkpoint_dir: PathBuf,
    pub schedule: EpochSchedule,
    pub batch_size: NonZeroUsize,
    /// Shuffle the samples of a shard every epoch.
    pub shuffle: bool,
    pub checkpoint_naming: CheckpointNaming,
    /// The index of the sample whose prediction latency is logged during evaluation.
    pub timing_sample: usize,
    /// Append every EPE result to this JSON lines file.
    pub epe_log: Option<PathBuf>,
    pub seed: Option<u64>,
    pub model: ModelConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dataset"),
            checkpoint_dir: PathBuf::from("checkpoint"),
            schedule: EpochSchedule::default(),
            batch_size: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            shuffle: true,
            checkpoint_naming: CheckpointNaming::default(),
            timing_sample: 10,
            epe_log: None,
            seed: None,
            model: ModelConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    /// `Io` if the file can't be read, `InvalidConfig` if it doesn't describe a valid config.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        info!("loading training config from {}", path.display());
        let content = fs::read_to_string(path)?;

        Self::from_json(&content).map_err(|e| match e {
            OrchestratorError::InvalidConfig(msg) => {
                OrchestratorError::InvalidConfig(format!("{}: {msg}", path.display()))
            }
            e => e,
        })
    }

    /// Parses and validates a JSON config.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field whose type alone doesn't rule out invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "checkpoint_dir must not be empty".into(),
            ));
        }

        self.model.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::OptimizerConfig;

    #[test]
    fn an_empty_object_is_the_default_config() {
        let config = TrainingConfig::from_json("{}").unwrap();
        assert_eq!(config, TrainingConfig::default());
        assert_eq!(config.schedule.as_slice(), &[8, 4, 2, 1]);
        assert_eq!(config.batch_size.get(), 4);
        assert_eq!(config.timing_sample, 10);
        assert_eq!(config.checkpoint_naming, CheckpointNaming::Global);
    }

    #[test]
    fn overrides_only_the_given_fields() {
        let config = TrainingConfig::from_json(
            r#"{
                "schedule": [3, 1],
                "checkpoint_naming": "per_pass",
                "seed": 42,
                "model": { "hidden": 8, "optimizer": { "gradient_descent": { "lr": 0.1 } } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.schedule.as_slice(), &[3, 1]);
        assert_eq!(config.checkpoint_naming, CheckpointNaming::PerPass);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.model.hidden.get(), 8);
        assert_eq!(
            config.model.optimizer,
            OptimizerConfig::GradientDescent { lr: 0.1 }
        );
        assert!(config.shuffle);
    }

    #[test]
    fn rejects_invalid_configs() {
        for json in [
            r#"{ "schedule": [1, 2] }"#,
            r#"{ "batch_size": 0 }"#,
            r#"{ "unknown": true }"#,
            r#"{ "model": { "max_shift": 0 } }"#,
        ] {
            let err = TrainingConfig::from_json(json).unwrap_err();
            assert!(
                matches!(err, OrchestratorError::InvalidConfig(_)),
                "{json} gave {err}"
            );
        }
    }
}
