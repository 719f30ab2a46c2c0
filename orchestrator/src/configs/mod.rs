mod dataset;
mod model;
mod training;

pub use dataset::DatasetConfig;
pub use model::{LossFnConfig, ModelConfig, OptimizerConfig};
pub use training::TrainingConfig;
