//! Convergence diagnostics: effective sample size and potential scale
//! reduction factor.
//!
//! Both work on per-chain traces of a scalar parameter. Chains are
//! truncated to the shortest chain length.

use crate::fit::{FittedModel, ParameterGroup};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Chain means, within-chain variance `W` and pooled variance estimate.
struct ChainMoments {
    m: usize,
    n: usize,
    means: Vec<f64>,
    w: f64,
    var_plus: f64,
}

fn chain_moments(chains: &[Vec<f64>]) -> Option<ChainMoments> {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min()?;
    if m == 0 || n < 2 {
        return None;
    }
    let means: Vec<f64> = chains
        .iter()
        .map(|c| c[..n].iter().sum::<f64>() / n as f64)
        .collect();
    let w = chains
        .iter()
        .zip(&means)
        .map(|(c, mu)| c[..n].iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (n - 1) as f64)
        .sum::<f64>()
        / m as f64;
    let b_over_n = if m > 1 {
        let grand = means.iter().sum::<f64>() / m as f64;
        means.iter().map(|mu| (mu - grand).powi(2)).sum::<f64>() / (m - 1) as f64
    } else {
        0.0
    };
    let var_plus = (n - 1) as f64 / n as f64 * w + b_over_n;
    Some(ChainMoments {
        m,
        n,
        means,
        w,
        var_plus,
    })
}

/// Lag-`lag` autocovariance of one chain (biased estimator).
fn autocovariance(chain: &[f64], mean: f64, lag: usize) -> f64 {
    let n = chain.len();
    if lag >= n {
        return 0.0;
    }
    (0..n - lag)
        .map(|i| (chain[i] - mean) * (chain[i + lag] - mean))
        .sum::<f64>()
        / n as f64
}

/// Effective sample size pooled over chains.
///
/// Uses Geyer's initial monotone positive sequence on the combined
/// autocorrelation estimate. A constant trace returns the total draw count.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let Some(mom) = chain_moments(chains) else {
        return chains.iter().map(Vec::len).sum::<usize>() as f64;
    };
    let total = (mom.m * mom.n) as f64;
    if mom.var_plus <= 0.0 || !mom.var_plus.is_finite() {
        return total;
    }

    let rho = |lag: usize| -> f64 {
        let mean_acov = chains
            .iter()
            .zip(&mom.means)
            .map(|(c, mu)| autocovariance(&c[..mom.n], *mu, lag))
            .sum::<f64>()
            / mom.m as f64;
        1.0 - (mom.w - mean_acov) / mom.var_plus
    };

    let mut sum_pairs = 0.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < mom.n {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        sum_pairs += pair;
        prev_pair = pair;
        lag += 2;
    }

    let tau = -1.0 + 2.0 * sum_pairs;
    if tau > 0.0 && tau.is_finite() {
        total / tau
    } else {
        total
    }
}

/// Gelman-Rubin potential scale reduction factor.
///
/// `None` with fewer than two chains, fewer than two draws per chain or no
/// within-chain variation.
pub fn potential_scale_reduction(chains: &[Vec<f64>]) -> Option<f64> {
    let mom = chain_moments(chains)?;
    if mom.m < 2 || mom.w <= 0.0 {
        return None;
    }
    Some((mom.var_plus / mom.w).sqrt())
}

/// Diagnostics of one scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceEntry {
    pub group: ParameterGroup,
    pub parameter: String,
    pub ess: f64,
    pub psrf: Option<f64>,
}

/// ESS and PSRF for the fixed effects and the residual covariance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub entries: Vec<ConvergenceEntry>,
    /// Total retained draws the diagnostics were computed from.
    pub total_draws: usize,
}

impl ConvergenceReport {
    /// Diagnose every beta entry and the upper triangle of the residual
    /// covariance.
    pub fn compute(model: &FittedModel) -> Self {
        let post = model.posterior();
        let species = model.config().response().species();
        let coefs = model.config().coefficient_names();
        let mut entries = Vec::new();

        for (j, sp) in species.iter().enumerate() {
            for (c, coef) in coefs.iter().enumerate() {
                let trace = post.beta_trace(c, j);
                entries.push(ConvergenceEntry {
                    group: ParameterGroup::Beta,
                    parameter: format!("beta[{}, {}]", coef, sp),
                    ess: effective_sample_size(&trace),
                    psrf: potential_scale_reduction(&trace),
                });
            }
        }
        for a in 0..species.len() {
            for b in a..species.len() {
                let trace = post.sigma_trace(a, b);
                entries.push(ConvergenceEntry {
                    group: ParameterGroup::Sigma,
                    parameter: format!("sigma[{}, {}]", species[a], species[b]),
                    ess: effective_sample_size(&trace),
                    psrf: potential_scale_reduction(&trace),
                });
            }
        }

        Self {
            entries,
            total_draws: post.n_draws(),
        }
    }

    /// Entries of one parameter group.
    pub fn group(&self, group: ParameterGroup) -> impl Iterator<Item = &ConvergenceEntry> + '_ {
        self.entries.iter().filter(move |e| e.group == group)
    }

    /// Mean ESS over a group, `None` if the group is empty.
    pub fn mean_ess(&self, group: ParameterGroup) -> Option<f64> {
        let values: Vec<f64> = self.group(group).map(|e| e.ess).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Largest PSRF over a group.
    pub fn max_psrf(&self, group: ParameterGroup) -> Option<f64> {
        self.group(group).filter_map(|e| e.psrf).reduce(f64::max)
    }

    /// Apply thresholds and log each warning.
    pub fn check(&self, criteria: &ConvergenceCriteria) -> Vec<ConvergenceWarning> {
        let min_ess = criteria.min_ess_fraction * self.total_draws as f64;
        let mut warnings = Vec::new();
        for e in &self.entries {
            if let Some(psrf) = e.psrf {
                if psrf > criteria.max_psrf {
                    warnings.push(ConvergenceWarning {
                        parameter: e.parameter.clone(),
                        kind: WarningKind::HighPsrf {
                            value: psrf,
                            limit: criteria.max_psrf,
                        },
                    });
                }
            }
            if e.ess < min_ess {
                warnings.push(ConvergenceWarning {
                    parameter: e.parameter.clone(),
                    kind: WarningKind::LowEss {
                        value: e.ess,
                        limit: min_ess,
                    },
                });
            }
        }
        for w in &warnings {
            warn!("{}", w);
        }
        warnings
    }
}

/// Thresholds for flagging poor convergence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceCriteria {
    /// PSRF above this is flagged.
    pub max_psrf: f64,
    /// ESS below this fraction of the total draws is flagged.
    pub min_ess_fraction: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_psrf: 1.1,
            min_ess_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    HighPsrf { value: f64, limit: f64 },
    LowEss { value: f64, limit: f64 },
}

/// A non-fatal convergence problem on one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    pub parameter: String,
    pub kind: WarningKind,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::HighPsrf { value, limit } => write!(
                f,
                "{}: potential scale reduction {:.3} exceeds {:.3}",
                self.parameter, value, limit
            ),
            WarningKind::LowEss { value, limit } => write!(
                f,
                "{}: effective sample size {:.1} below {:.1}",
                self.parameter, value, limit
            ),
        }
    }
}
