//! YAML-configured composition of loading, transforms, model building,
//! fitting, diagnostics and reporting.

mod config;
mod runner;

pub use config::{InputConfig, PipelineConfig, SelfEffectConfig, TransformStep};
pub use runner::{
    analyze, Analysis, Pipeline, PipelineOutput, ASSOCIATIONS_FILE, CONVERGENCE_FILE, MODEL_FILE,
    MODEL_FIT_FILE, PARAMETERS_FILE, TRACE_BETA_FILE, VARIANCE_FILE,
};
