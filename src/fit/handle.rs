//! The fitted-model handle returned by a sampler.

use crate::error::{JsdmError, Result};
use crate::fit::{Draw, PosteriorDraws, SamplingParams};
use crate::model::{Distribution, ModelConfig};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// A fitted model: the configuration it was fitted on, the sampling
/// parameters and the posterior draws. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    config: ModelConfig,
    params: SamplingParams,
    sampler: String,
    posterior: PosteriorDraws,
}

impl FittedModel {
    /// Wrap posterior draws produced by any sampler.
    ///
    /// Fails with [`JsdmError::Fit`] if the draws do not match the
    /// configuration's dimensions; no partial handle is returned.
    pub fn from_draws(
        config: ModelConfig,
        params: SamplingParams,
        sampler: &str,
        posterior: PosteriorDraws,
    ) -> Result<Self> {
        if posterior.n_draws() == 0 {
            return Err(JsdmError::Fit("posterior contains no draws".to_string()));
        }
        let n_coef = config.n_coefficients();
        let n_species = config.n_species();
        let level_sizes: Vec<usize> = config
            .random_levels()
            .levels
            .iter()
            .map(|l| l.n_levels())
            .collect();

        for (c, chain) in posterior.chains.iter().enumerate() {
            for (s, draw) in chain.iter().enumerate() {
                let fail = |what: &str| {
                    JsdmError::Fit(format!("chain {} draw {}: {} has the wrong shape", c, s, what))
                };
                if draw.beta.shape() != (n_coef, n_species) {
                    return Err(fail("beta"));
                }
                if draw.sigma.shape() != (n_species, n_species) {
                    return Err(fail("sigma"));
                }
                if draw.random.len() != level_sizes.len()
                    || draw
                        .random
                        .iter()
                        .zip(&level_sizes)
                        .any(|(m, &n)| m.shape() != (n, n_species))
                {
                    return Err(fail("random effects"));
                }
            }
        }

        Ok(Self {
            config,
            params,
            sampler: sampler.to_string(),
            posterior,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// Name of the sampler that produced the draws.
    pub fn sampler(&self) -> &str {
        &self.sampler
    }

    pub fn posterior(&self) -> &PosteriorDraws {
        &self.posterior
    }

    /// Linear predictor of one species under one draw.
    pub fn linear_predictor(&self, draw: &Draw, species: usize) -> DVector<f64> {
        let x = self.config.design(species).matrix();
        let beta = draw.beta.column(species);
        let mut eta = x * beta;
        for (level, effects) in self.config.random_levels().levels.iter().zip(&draw.random) {
            for (unit, &l) in level.unit_levels.iter().enumerate() {
                eta[unit] += effects[(l, species)];
            }
        }
        eta
    }

    /// Posterior-predictive mean (units × species) under one draw.
    pub fn predict_draw(&self, draw: &Draw) -> DMatrix<f64> {
        let n = self.config.n_units();
        let m = self.config.n_species();
        let std_normal = Normal::new(0.0, 1.0).ok();
        let mut out = DMatrix::zeros(n, m);
        for j in 0..m {
            let eta = self.linear_predictor(draw, j);
            let var = draw.sigma[(j, j)];
            for i in 0..n {
                out[(i, j)] = match self.config.distribution() {
                    Distribution::Normal => eta[i],
                    Distribution::Probit => std_normal.as_ref().map_or(f64::NAN, |d| d.cdf(eta[i])),
                    Distribution::Poisson => eta[i].exp(),
                    Distribution::LognormalPoisson => (eta[i] + 0.5 * var).exp(),
                };
            }
        }
        out
    }

    /// Per-draw predictions, chain by chain.
    pub fn predict_draws(&self) -> Vec<DMatrix<f64>> {
        self.posterior.iter().map(|d| self.predict_draw(d)).collect()
    }

    /// Posterior mean of the predictions (units × species).
    pub fn predict(&self) -> DMatrix<f64> {
        let mut sum = DMatrix::zeros(self.config.n_units(), self.config.n_species());
        for d in self.posterior.iter() {
            sum += self.predict_draw(d);
        }
        sum / self.posterior.n_draws() as f64
    }

    /// Serialize the handle to JSON for reuse without refitting.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.as_ref().display(), "saved fitted model");
        Ok(())
    }

    /// Load a handle saved with [`Self::save`] (or exported in the same
    /// format by an external engine). Draw shapes are re-validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = path.as_ref().display().to_string();
        let file = File::open(path.as_ref()).map_err(|e| JsdmError::load(&source, e.to_string()))?;
        let raw: FittedModel = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| JsdmError::load(&source, e.to_string()))?;
        Self::from_draws(raw.config, raw.params, &raw.sampler, raw.posterior)
    }
}
