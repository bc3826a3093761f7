//! Reference sampler for Gaussian responses with random intercepts.
//!
//! For each species `y = Xβ + Σ Z_l u_l + ε` with a flat prior on `β`,
//! `u_l ~ N(0, ratio · σ² I)` and a Jeffreys prior on `σ²`. The joint
//! posterior is available in closed form, so every iteration is an
//! independent Monte Carlo draw:
//!
//! - `σ² ~ S / χ²(n_obs - p)` with `S = y'y - θ̂'Aθ̂`
//! - `θ | σ² ~ N(θ̂, σ² A⁻¹)` with `A = W'W + P`, `W = [X | Z_1 | ...]`
//!
//! The residual covariance of a draw keeps `σ²_j` on the diagonal and
//! scales the pairwise residual correlation of that draw off the diagonal.

use crate::error::{JsdmError, Result};
use crate::fit::{Draw, FittedModel, PosteriorDraws, Sampler, SamplingParams};
use crate::model::{Distribution, ModelConfig};
use nalgebra::{DMatrix, DVector};
use rand::distributions::Distribution as RandDistribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, Normal};
use tracing::debug;

/// Prior settings of the reference sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjugateNormalConfig {
    /// Random-effect prior variance as a multiple of the residual variance.
    pub random_prior_ratio: f64,
    /// Added to the fixed-effect diagonal of `W'W`.
    pub ridge: f64,
}

impl Default for ConjugateNormalConfig {
    fn default() -> Self {
        Self {
            random_prior_ratio: 1.0,
            ridge: 0.0,
        }
    }
}

/// Closed-form posterior sampler for [`Distribution::Normal`] models.
#[derive(Debug, Clone, Default)]
pub struct ConjugateNormalSampler {
    config: ConjugateNormalConfig,
}

/// Per-species posterior quantities, computed once before sampling.
#[derive(Debug, Clone)]
struct SpeciesPosterior {
    /// Full design `[X | Z_1 | ...]` over all units.
    design: DMatrix<f64>,
    observed: Vec<usize>,
    mean: DVector<f64>,
    /// Lower factor `F` with `F F' = A⁻¹`.
    factor: DMatrix<f64>,
    scale: f64,
    chi: ChiSquared,
}

impl ConjugateNormalSampler {
    pub fn new(config: ConjugateNormalConfig) -> Result<Self> {
        if !(config.random_prior_ratio.is_finite() && config.random_prior_ratio > 0.0) {
            return Err(JsdmError::InvalidParameter(format!(
                "random_prior_ratio must be positive, got {}",
                config.random_prior_ratio
            )));
        }
        if !(config.ridge.is_finite() && config.ridge >= 0.0) {
            return Err(JsdmError::InvalidParameter(format!(
                "ridge must be non-negative, got {}",
                config.ridge
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConjugateNormalConfig {
        &self.config
    }

    fn prepare(&self, model: &ModelConfig, species: usize) -> Result<SpeciesPosterior> {
        let name = &model.response().species()[species];
        let x = model.design(species).matrix();
        let n_units = model.n_units();
        let n_fixed = x.ncols();
        let z_blocks: Vec<DMatrix<f64>> = model
            .random_levels()
            .levels
            .iter()
            .map(|l| l.design_matrix())
            .collect();
        let k = n_fixed + z_blocks.iter().map(|z| z.ncols()).sum::<usize>();

        let mut design = DMatrix::zeros(n_units, k);
        design.columns_mut(0, n_fixed).copy_from(x);
        let mut offset = n_fixed;
        for z in &z_blocks {
            design.columns_mut(offset, z.ncols()).copy_from(z);
            offset += z.ncols();
        }

        let column = model.response().column(species);
        let observed: Vec<usize> = (0..n_units).filter(|&i| column[i].is_some()).collect();
        let df = observed.len() as f64 - n_fixed as f64;
        if df <= 0.0 {
            return Err(JsdmError::Fit(format!(
                "species '{}' has {} observed units for {} fixed effects",
                name,
                observed.len(),
                n_fixed
            )));
        }

        let w = design.select_rows(observed.iter());
        let y = DVector::from_iterator(observed.len(), observed.iter().filter_map(|&i| column[i]));

        let mut a = w.transpose() * &w;
        for c in 0..k {
            a[(c, c)] += if c < n_fixed {
                self.config.ridge
            } else {
                1.0 / self.config.random_prior_ratio
            };
        }
        let chol = a.clone().cholesky().ok_or_else(|| {
            JsdmError::Fit(format!("singular design for species '{}'", name))
        })?;
        let mean = chol.solve(&(w.transpose() * &y));
        let scale = y.dot(&y) - mean.dot(&(&a * &mean));
        if !(scale.is_finite() && scale > 0.0) {
            return Err(JsdmError::Fit(format!(
                "species '{}' has no residual variation",
                name
            )));
        }
        let factor = chol
            .inverse()
            .cholesky()
            .ok_or_else(|| JsdmError::Fit(format!("posterior covariance of '{}' is not positive definite", name)))?
            .l();
        let chi = ChiSquared::new(df).map_err(|e| JsdmError::Fit(e.to_string()))?;

        debug!(species = %name, observed = observed.len(), parameters = k, "prepared conjugate posterior");

        Ok(SpeciesPosterior {
            design,
            observed,
            mean,
            factor,
            scale,
            chi,
        })
    }
}

impl Sampler for ConjugateNormalSampler {
    fn name(&self) -> &str {
        "conjugate_normal"
    }

    fn sample(&self, model: &ModelConfig, params: &SamplingParams) -> Result<FittedModel> {
        params.validate()?;
        if model.distribution() != Distribution::Normal {
            return Err(JsdmError::Fit(format!(
                "{} only supports the normal distribution, got {}",
                self.name(),
                model.distribution().name()
            )));
        }

        let posteriors = (0..model.n_species())
            .map(|j| self.prepare(model, j))
            .collect::<Result<Vec<_>>>()?;
        let std_normal = Normal::new(0.0, 1.0).map_err(|e| JsdmError::Fit(e.to_string()))?;

        let chains: Vec<Vec<Draw>> = (0..params.chains)
            .into_par_iter()
            .map(|c| run_chain(model, &posteriors, &std_normal, params, c))
            .collect();

        FittedModel::from_draws(model.clone(), *params, self.name(), PosteriorDraws::new(chains))
    }
}

fn run_chain(
    model: &ModelConfig,
    posteriors: &[SpeciesPosterior],
    std_normal: &Normal,
    params: &SamplingParams,
    chain: usize,
) -> Vec<Draw> {
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(chain as u64));
    let mut draws = Vec::with_capacity(params.samples);

    for iter in 0..params.iterations_per_chain() {
        let mut thetas = Vec::with_capacity(posteriors.len());
        let mut variances = Vec::with_capacity(posteriors.len());
        for post in posteriors {
            let sigma2 = post.scale / post.chi.sample(&mut rng);
            let z = DVector::from_fn(post.mean.len(), |_, _| std_normal.sample(&mut rng));
            thetas.push(&post.mean + &post.factor * z * sigma2.sqrt());
            variances.push(sigma2);
        }
        if params.is_retained(iter) {
            draws.push(assemble(model, posteriors, &thetas, &variances));
        }
    }
    draws
}

fn assemble(
    model: &ModelConfig,
    posteriors: &[SpeciesPosterior],
    thetas: &[DVector<f64>],
    variances: &[f64],
) -> Draw {
    let m = posteriors.len();
    let p = model.n_coefficients();
    let beta = DMatrix::from_fn(p, m, |r, j| thetas[j][r]);

    let mut offset = p;
    let random = model
        .random_levels()
        .levels
        .iter()
        .map(|level| {
            let start = offset;
            offset += level.n_levels();
            DMatrix::from_fn(level.n_levels(), m, |r, j| thetas[j][start + r])
        })
        .collect();

    let residuals: Vec<Vec<Option<f64>>> = posteriors
        .iter()
        .zip(thetas)
        .enumerate()
        .map(|(j, (post, theta))| {
            let fitted = &post.design * theta;
            let mut res = vec![None; fitted.len()];
            for &i in &post.observed {
                res[i] = model.response().get(i, j).map(|y| y - fitted[i]);
            }
            res
        })
        .collect();

    let mut sigma = DMatrix::from_diagonal(&DVector::from_column_slice(variances));
    for a in 0..m {
        for b in (a + 1)..m {
            let cov = pairwise_correlation(&residuals[a], &residuals[b])
                * (variances[a] * variances[b]).sqrt();
            sigma[(a, b)] = cov;
            sigma[(b, a)] = cov;
        }
    }

    Draw { beta, random, sigma }
}

/// Pearson correlation over units observed in both columns; 0 when
/// undefined.
fn pairwise_correlation(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 3 {
        return 0.0;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sab += (x - mean_a) * (y - mean_b);
        saa += (x - mean_a).powi(2);
        sbb += (y - mean_b).powi(2);
    }
    if saa <= 0.0 || sbb <= 0.0 {
        return 0.0;
    }
    sab / (saa * sbb).sqrt()
}
