//! Posterior draws grouped by chain.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// One retained posterior draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    /// Fixed effects (coefficients × species).
    pub beta: DMatrix<f64>,
    /// Random effects per level (levels of that factor × species).
    pub random: Vec<DMatrix<f64>>,
    /// Residual covariance (species × species).
    pub sigma: DMatrix<f64>,
}

/// Parameter groups exposed by a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterGroup {
    /// Fixed effects.
    Beta,
    /// Random effects of the level with this index.
    Random(usize),
    /// Residual covariance.
    Sigma,
}

/// Posterior draws, `chains[c][s]` is draw `s` of chain `c`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraws {
    pub chains: Vec<Vec<Draw>>,
}

impl PosteriorDraws {
    pub fn new(chains: Vec<Vec<Draw>>) -> Self {
        Self { chains }
    }

    /// Number of chains.
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Draws in the shortest chain.
    pub fn n_samples(&self) -> usize {
        self.chains.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Total draws across chains.
    pub fn n_draws(&self) -> usize {
        self.chains.iter().map(Vec::len).sum()
    }

    /// Iterate over every draw, chain by chain.
    pub fn iter(&self) -> impl Iterator<Item = &Draw> + '_ {
        self.chains.iter().flatten()
    }

    /// Per-chain trace of a scalar extracted from each draw.
    pub fn trace<F>(&self, extract: F) -> Vec<Vec<f64>>
    where
        F: Fn(&Draw) -> f64,
    {
        self.chains
            .iter()
            .map(|chain| chain.iter().map(&extract).collect())
            .collect()
    }

    /// Trace of coefficient `coef` for species `species`.
    pub fn beta_trace(&self, coef: usize, species: usize) -> Vec<Vec<f64>> {
        self.trace(|d| d.beta[(coef, species)])
    }

    /// Trace of residual covariance entry `(i, j)`.
    pub fn sigma_trace(&self, i: usize, j: usize) -> Vec<Vec<f64>> {
        self.trace(|d| d.sigma[(i, j)])
    }

    /// Trace of random effect of level `level_value` of factor `level`.
    pub fn random_trace(&self, level: usize, level_value: usize, species: usize) -> Vec<Vec<f64>> {
        self.trace(|d| d.random[level][(level_value, species)])
    }

    /// Posterior mean of the fixed effects.
    pub fn beta_mean(&self) -> Option<DMatrix<f64>> {
        let first = self.iter().next()?;
        let mut sum = DMatrix::zeros(first.beta.nrows(), first.beta.ncols());
        for d in self.iter() {
            sum += &d.beta;
        }
        Some(sum / self.n_draws() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(b: f64) -> Draw {
        Draw {
            beta: DMatrix::from_element(2, 1, b),
            random: vec![DMatrix::from_element(3, 1, -b)],
            sigma: DMatrix::from_element(1, 1, 1.0),
        }
    }

    #[test]
    fn test_traces() {
        let post = PosteriorDraws::new(vec![
            vec![draw(1.0), draw(2.0)],
            vec![draw(3.0), draw(4.0)],
        ]);
        assert_eq!(post.n_chains(), 2);
        assert_eq!(post.n_samples(), 2);
        assert_eq!(post.n_draws(), 4);
        assert_eq!(post.beta_trace(1, 0), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(post.random_trace(0, 2, 0)[1], vec![-3.0, -4.0]);
        assert_eq!(post.beta_mean().unwrap()[(0, 0)], 2.5);
    }

    #[test]
    fn test_empty() {
        let post = PosteriorDraws::default();
        assert_eq!(post.n_samples(), 0);
        assert!(post.beta_mean().is_none());
    }
}
