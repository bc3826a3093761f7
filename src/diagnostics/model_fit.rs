//! In-sample explanatory power per species.

use crate::fit::FittedModel;
use serde::{Deserialize, Serialize};

/// R² and RMSE of one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesFit {
    pub species: String,
    /// Observed units used.
    pub n_observed: usize,
    /// `1 - SS_res / SS_tot`; `NaN` when the observed response is constant.
    pub r_squared: f64,
    pub rmse: f64,
}

/// Model fit for every species plus the across-species mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    pub species: Vec<SpeciesFit>,
}

impl ModelFit {
    /// Compare the posterior-mean prediction with the observed responses.
    /// Missing responses are skipped.
    pub fn compute(model: &FittedModel) -> Self {
        let predicted = model.predict();
        let response = model.config().response();

        let species = response
            .species()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let pairs: Vec<(f64, f64)> = (0..response.n_units())
                    .filter_map(|i| response.get(i, j).map(|y| (y, predicted[(i, j)])))
                    .collect();
                let n = pairs.len();
                let mean = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
                let ss_res: f64 = pairs.iter().map(|(y, yhat)| (y - yhat).powi(2)).sum();
                let ss_tot: f64 = pairs.iter().map(|(y, _)| (y - mean).powi(2)).sum();
                SpeciesFit {
                    species: name.clone(),
                    n_observed: n,
                    r_squared: if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { f64::NAN },
                    rmse: (ss_res / n as f64).sqrt(),
                }
            })
            .collect();

        Self { species }
    }

    /// Mean R² over species with a defined value.
    pub fn mean_r_squared(&self) -> f64 {
        mean_finite(self.species.iter().map(|s| s.r_squared))
    }

    pub fn mean_rmse(&self) -> f64 {
        mean_finite(self.species.iter().map(|s| s.rmse))
    }
}

fn mean_finite(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CovariateTable, ResponseMatrix};
    use crate::fit::{Draw, PosteriorDraws, SamplingParams};
    use crate::model::ModelSpecBuilder;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_r_squared_and_rmse() {
        let response = ResponseMatrix::from_columns(vec![
            ("a".to_string(), vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            ("b".to_string(), vec![Some(1.0), Some(1.0), None, Some(1.0)]),
        ])
        .unwrap();
        let cov = CovariateTable::from_columns(vec![("x".to_string(), vec![1.0, 2.0, 3.0, 5.0])]).unwrap();
        let config = ModelSpecBuilder::new(response)
            .shared_covariates(cov)
            .predictors(&["x"])
            .build()
            .unwrap();
        // a: yhat = x, b: yhat = 1
        let draw = Draw {
            beta: DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]),
            random: vec![],
            sigma: DMatrix::identity(2, 2),
        };
        let model = FittedModel::from_draws(
            config,
            SamplingParams::default(),
            "test",
            PosteriorDraws::new(vec![vec![draw]]),
        )
        .unwrap();

        let fit = ModelFit::compute(&model);
        // a: residuals 0,0,0,-1; ss_tot = 5
        assert_relative_eq!(fit.species[0].r_squared, 0.8);
        assert_relative_eq!(fit.species[0].rmse, 0.5);
        assert_eq!(fit.species[1].n_observed, 3);
        assert!(fit.species[1].r_squared.is_nan());
        assert_relative_eq!(fit.species[1].rmse, 0.0);
        assert_relative_eq!(fit.mean_r_squared(), 0.8);
        assert_relative_eq!(fit.mean_rmse(), 0.25);
    }
}
