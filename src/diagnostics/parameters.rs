//! Posterior summary of the fixed effects.

use crate::fit::FittedModel;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

/// Posterior summary of one coefficient for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub coefficient: String,
    pub species: String,
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub upper: f64,
    /// Fraction of draws above zero.
    pub support_positive: f64,
    /// Fraction of draws below zero.
    pub support_negative: f64,
}

impl ParameterSummary {
    /// Support for the sign of the posterior mean.
    pub fn support(&self) -> f64 {
        self.support_positive.max(self.support_negative)
    }
}

/// Summarize every draw of `values` with a central interval of mass
/// `1 - alpha`.
fn summarize(coefficient: &str, species: &str, values: Vec<f64>, alpha: f64) -> ParameterSummary {
    let n = values.len() as f64;
    let mean = values.iter().mean();
    let sd = if values.len() > 1 { values.iter().std_dev() } else { 0.0 };
    let support_positive = values.iter().filter(|v| **v > 0.0).count() as f64 / n;
    let support_negative = values.iter().filter(|v| **v < 0.0).count() as f64 / n;
    let mut data = Data::new(values);
    ParameterSummary {
        coefficient: coefficient.to_string(),
        species: species.to_string(),
        mean,
        sd,
        lower: data.quantile(alpha / 2.0),
        upper: data.quantile(1.0 - alpha / 2.0),
        support_positive,
        support_negative,
    }
}

/// Mean, sd, 95% interval and sign support for every coefficient and
/// species, species-major.
pub fn parameter_table(model: &FittedModel) -> Vec<ParameterSummary> {
    parameter_table_with_alpha(model, 0.05)
}

/// As [`parameter_table`] with a `1 - alpha` interval.
pub fn parameter_table_with_alpha(model: &FittedModel, alpha: f64) -> Vec<ParameterSummary> {
    let config = model.config();
    let post = model.posterior();
    let coefs = config.coefficient_names();
    let mut rows = Vec::with_capacity(coefs.len() * config.n_species());
    for (j, species) in config.response().species().iter().enumerate() {
        for (c, coef) in coefs.iter().enumerate() {
            let values: Vec<f64> = post.iter().map(|d| d.beta[(c, j)]).collect();
            rows.push(summarize(coef, species, values, alpha));
        }
    }
    rows
}
