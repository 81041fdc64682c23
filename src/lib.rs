pub mod config;
pub mod data;
pub mod idx;
pub mod model;
pub mod summary;

pub use config::{ConvNetConfig, RunConfig};
pub use model::{Activation, ConvNet, LayerSpec};
pub use summary::{ModelSummary, ShapeError, infer_shapes};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;
