pub mod activations;
mod builder;
pub mod features;
pub mod layers;
pub mod loss;
mod model;
mod pixel_net;

pub use builder::{LossSpec, OptimizerSpec, PixelNetSpec};
pub use model::{
    DisparityModel, EpochCallback, FitOptions, FitReport, ModelFactory, NamedTensor, NoCallback,
};
pub use pixel_net::PixelNet;
