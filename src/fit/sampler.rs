//! The posterior-sampler seam.

use crate::error::Result;
use crate::fit::{FittedModel, SamplingParams};
use crate::model::ModelConfig;
use std::time::Instant;
use tracing::info;

/// A hierarchical multivariate regression engine.
///
/// Implementations consume a validated [`ModelConfig`] and return posterior
/// draws wrapped in a [`FittedModel`]. A failure must not leave a partial
/// handle behind: either every requested draw is returned or an error is.
pub trait Sampler {
    /// Short name recorded in the fitted handle.
    fn name(&self) -> &str;

    /// Draw from the posterior of `config`.
    fn sample(&self, config: &ModelConfig, params: &SamplingParams) -> Result<FittedModel>;
}

/// Validate the parameters, run a sampler and log the outcome.
pub fn fit<S: Sampler + ?Sized>(
    sampler: &S,
    config: &ModelConfig,
    params: &SamplingParams,
) -> Result<FittedModel> {
    params.validate()?;
    info!(
        sampler = sampler.name(),
        species = config.n_species(),
        units = config.n_units(),
        chains = params.chains,
        samples = params.samples,
        "fitting model"
    );
    let start = Instant::now();
    let model = sampler.sample(config, params)?;
    info!(
        draws = model.posterior().n_draws(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "model fitted"
    );
    Ok(model)
}
