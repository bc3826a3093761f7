//! Diagnostics computed from posterior draws.
//!
//! - [`convergence`]: effective sample size and potential scale reduction
//! - [`model_fit`]: in-sample R² and RMSE per species
//! - [`variance`]: variance partitioning over predictor groups and random levels
//! - [`associations`]: residual correlation with posterior sign support
//! - [`parameters`]: fixed-effect summary table

pub mod associations;
pub mod convergence;
pub mod model_fit;
pub mod parameters;
pub mod variance;

pub use associations::{covariance_to_correlation, filter_by_support, AssociationMatrix, DEFAULT_SUPPORT_LEVEL};
pub use convergence::{
    effective_sample_size, potential_scale_reduction, ConvergenceCriteria, ConvergenceEntry,
    ConvergenceReport, ConvergenceWarning, WarningKind,
};
pub use model_fit::{ModelFit, SpeciesFit};
pub use parameters::{parameter_table, parameter_table_with_alpha, ParameterSummary};
pub use variance::{partition_variance, VarianceGroup, VariancePartition};
