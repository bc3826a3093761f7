//! Residual species associations from the posterior residual covariance.

use crate::error::{JsdmError, Result};
use crate::fit::FittedModel;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Default posterior support required to keep an association.
pub const DEFAULT_SUPPORT_LEVEL: f64 = 0.65;

/// Posterior summary of the residual correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationMatrix {
    pub species: Vec<String>,
    /// Posterior mean correlation.
    pub mean: DMatrix<f64>,
    /// Fraction of draws with a positive correlation.
    pub support_positive: DMatrix<f64>,
    /// Fraction of draws with a negative correlation.
    pub support_negative: DMatrix<f64>,
}

/// Convert a covariance matrix to a correlation matrix. Entries touching a
/// non-positive variance are zero off the diagonal.
pub fn covariance_to_correlation(cov: &DMatrix<f64>) -> DMatrix<f64> {
    let n = cov.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            return 1.0;
        }
        let denom = (cov[(i, i)] * cov[(j, j)]).sqrt();
        if denom > 0.0 && denom.is_finite() {
            cov[(i, j)] / denom
        } else {
            0.0
        }
    })
}

impl AssociationMatrix {
    /// Summarize the residual correlation over every posterior draw.
    pub fn compute(model: &FittedModel) -> Self {
        let species = model.config().response().species().to_vec();
        let m = species.len();
        let mut mean = DMatrix::zeros(m, m);
        let mut positive = DMatrix::zeros(m, m);
        let mut negative = DMatrix::zeros(m, m);

        let post = model.posterior();
        for draw in post.iter() {
            let corr = covariance_to_correlation(&draw.sigma);
            mean += &corr;
            positive += corr.map(|r| if r > 0.0 { 1.0 } else { 0.0 });
            negative += corr.map(|r| if r < 0.0 { 1.0 } else { 0.0 });
        }
        let n = post.n_draws() as f64;

        Self {
            species,
            mean: mean / n,
            support_positive: positive / n,
            support_negative: negative / n,
        }
    }

    /// Mean correlation with unsupported entries zeroed.
    pub fn filtered(&self, support_level: f64) -> Result<DMatrix<f64>> {
        filter_by_support(
            &self.mean,
            &self.support_positive,
            &self.support_negative,
            support_level,
        )
    }

    /// Species pairs kept at `support_level`, strongest first.
    pub fn supported_pairs(&self, support_level: f64) -> Result<Vec<(String, String, f64)>> {
        let filtered = self.filtered(support_level)?;
        let m = self.species.len();
        let mut pairs = Vec::new();
        for a in 0..m {
            for b in (a + 1)..m {
                let r = filtered[(a, b)];
                if r != 0.0 {
                    pairs.push((self.species[a].clone(), self.species[b].clone(), r));
                }
            }
        }
        pairs.sort_by(|x, y| y.2.abs().total_cmp(&x.2.abs()));
        Ok(pairs)
    }
}

/// Keep an entry where positive support or negative support exceeds
/// `support_level`, zero it otherwise. The diagonal stays 1.
pub fn filter_by_support(
    mean: &DMatrix<f64>,
    support_positive: &DMatrix<f64>,
    support_negative: &DMatrix<f64>,
    support_level: f64,
) -> Result<DMatrix<f64>> {
    if !(0.0..=1.0).contains(&support_level) {
        return Err(JsdmError::InvalidParameter(format!(
            "support level must be within [0, 1], got {}",
            support_level
        )));
    }
    if mean.shape() != support_positive.shape() || mean.shape() != support_negative.shape() {
        return Err(JsdmError::InvalidParameter(
            "association and support matrices differ in shape".to_string(),
        ));
    }
    Ok(DMatrix::from_fn(mean.nrows(), mean.ncols(), |i, j| {
        if i == j {
            1.0
        } else if support_positive[(i, j)] > support_level || support_negative[(i, j)] > support_level {
            mean[(i, j)]
        } else {
            0.0
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ResponseMatrix;
    use crate::fit::{Draw, PosteriorDraws, SamplingParams};
    use crate::model::ModelSpecBuilder;
    use approx::assert_relative_eq;

    #[test]
    fn test_filter_by_support_threshold() {
        let mean = DMatrix::from_row_slice(3, 3, &[1.0, 0.4, -0.3, 0.4, 1.0, 0.2, -0.3, 0.2, 1.0]);
        let pos = DMatrix::from_row_slice(3, 3, &[1.0, 0.70, 0.45, 0.70, 1.0, 0.55, 0.45, 0.55, 1.0]);
        let neg = DMatrix::from_row_slice(3, 3, &[0.0, 0.30, 0.40, 0.30, 0.0, 0.45, 0.40, 0.45, 0.0]);

        let filtered = filter_by_support(&mean, &pos, &neg, 0.65).unwrap();
        assert_relative_eq!(filtered[(0, 1)], 0.4);
        assert_relative_eq!(filtered[(1, 0)], 0.4);
        assert_relative_eq!(filtered[(1, 2)], 0.0);
        assert_relative_eq!(filtered[(0, 2)], 0.0);
        assert_relative_eq!(filtered[(2, 2)], 1.0);
    }

    #[test]
    fn test_negative_support_kept() {
        let mean = DMatrix::from_row_slice(2, 2, &[1.0, -0.5, -0.5, 1.0]);
        let pos = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.1, 1.0]);
        let neg = DMatrix::from_row_slice(2, 2, &[0.0, 0.9, 0.9, 0.0]);
        let filtered = filter_by_support(&mean, &pos, &neg, 0.65).unwrap();
        assert_relative_eq!(filtered[(0, 1)], -0.5);
    }

    #[test]
    fn test_invalid_level() {
        let m = DMatrix::identity(2, 2);
        assert!(filter_by_support(&m, &m, &m, 1.5).is_err());
    }

    #[test]
    fn test_compute_from_draws() {
        let response = ResponseMatrix::from_dense(vec![
            ("morio".to_string(), vec![1.0, 2.0, 3.0]),
            ("mascula".to_string(), vec![2.0, 1.0, 0.0]),
        ])
        .unwrap();
        let config = ModelSpecBuilder::new(response).build().unwrap();
        let draw = |c: f64| Draw {
            beta: DMatrix::zeros(1, 2),
            random: vec![],
            sigma: DMatrix::from_row_slice(2, 2, &[4.0, c, c, 1.0]),
        };
        let model = FittedModel::from_draws(
            config,
            SamplingParams::default(),
            "test",
            PosteriorDraws::new(vec![vec![draw(1.0), draw(1.0), draw(1.0), draw(-1.0)]]),
        )
        .unwrap();

        let assoc = AssociationMatrix::compute(&model);
        assert_relative_eq!(assoc.support_positive[(0, 1)], 0.75);
        assert_relative_eq!(assoc.support_negative[(0, 1)], 0.25);
        assert_relative_eq!(assoc.mean[(0, 1)], 0.25);
        assert_relative_eq!(assoc.mean[(0, 0)], 1.0);

        let pairs = assoc.supported_pairs(0.65).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "morio");
        assert!(assoc.supported_pairs(0.8).unwrap().is_empty());
    }
}
