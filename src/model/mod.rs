//! Model specification: design matrices and the validated configuration.

mod design;
mod spec;

pub use design::DesignMatrix;
pub use spec::{Distribution, ModelConfig, ModelSpecBuilder};
