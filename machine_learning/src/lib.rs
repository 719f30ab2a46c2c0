pub mod arch;
pub mod dataset;
pub mod error;
pub mod optimization;

pub use dataset::{DatasetShape, StereoView};
pub use error::{MlErr, Result};
