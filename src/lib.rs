//! Composable Joint Species Distribution Modelling (JSDM) Library
//!
//! This library prepares ecological survey data for hierarchical joint
//! species distribution models, hands a validated configuration to a
//! posterior sampler, and reports diagnostics from the posterior draws.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (ObservationTable, ResponseMatrix, covariates, random levels)
//! - **transform**: Pure column transforms (log1p, relativize, self-effect covariates)
//! - **model**: Validated model configuration (ModelSpecBuilder, design matrices)
//! - **fit**: Sampler trait, sampling parameters, posterior draws and the fitted handle
//! - **diagnostics**: Convergence, model fit, variance partitioning, associations
//! - **report**: TSV output of diagnostics and traces
//! - **pipeline**: YAML-configured composition and execution
//!
//! # Example
//!
//! ```no_run
//! use composable_jsdm::prelude::*;
//!
//! let table = ObservationTable::from_delimited("orchids.csv", &LoadOptions::csv("plot")).unwrap();
//! let response = table.to_response(&["morio", "sambucina", "mascula"]).unwrap();
//! let covariates = table.to_covariates(&["plant_height", "flowers_open"]).unwrap();
//! let plots = RandomLevel::from_table(&table, "plot").unwrap();
//!
//! let config = ModelSpecBuilder::new(response.relativize().unwrap())
//!     .shared_covariates(covariates)
//!     .predictors(&["plant_height", "flowers_open"])
//!     .random_level(plots)
//!     .build()
//!     .unwrap();
//!
//! let model = fit(&ConjugateNormalSampler::default(), &config, &SamplingParams::default()).unwrap();
//! let associations = AssociationMatrix::compute(&model);
//! let kept = associations.filtered(0.65).unwrap();
//! ```

pub mod data;
pub mod diagnostics;
pub mod error;
pub mod fit;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod transform;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        CovariateSpec, CovariateTable, Formula, LoadOptions, MixedFormula, ObservationTable,
        RandomLevel, RandomLevelSpec, ResponseMatrix, Term, Variable, VariableType, INTERCEPT,
    };
    pub use crate::diagnostics::{
        effective_sample_size, filter_by_support, parameter_table, partition_variance,
        potential_scale_reduction, AssociationMatrix, ConvergenceCriteria, ConvergenceReport,
        ConvergenceWarning, ModelFit, ParameterSummary, VarianceGroup, VariancePartition,
        DEFAULT_SUPPORT_LEVEL,
    };
    pub use crate::error::{JsdmError, Result};
    pub use crate::fit::{
        fit, ConjugateNormalConfig, ConjugateNormalSampler, Draw, FittedModel, ParameterGroup,
        PosteriorDraws, Sampler, SamplingParams,
    };
    pub use crate::model::{DesignMatrix, Distribution, ModelConfig, ModelSpecBuilder};
    pub use crate::pipeline::{Analysis, Pipeline, PipelineConfig, PipelineOutput, TransformStep};
    pub use crate::transform::{
        expm1, log1p, per_species_covariates, relativize, standardize, zero_out_self,
    };
}
