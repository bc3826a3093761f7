//! Variance partitioning over fixed-effect groups and random levels.

use crate::error::{JsdmError, Result};
use crate::fit::FittedModel;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named group of fixed-effect coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceGroup {
    pub name: String,
    pub columns: Vec<String>,
}

impl VarianceGroup {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// One group per coefficient.
    pub fn per_coefficient(coefficients: &[String]) -> Vec<Self> {
        coefficients
            .iter()
            .map(|c| Self {
                name: c.clone(),
                columns: vec![c.clone()],
            })
            .collect()
    }
}

/// Fractions of explained variance, components × species.
///
/// Components are the fixed-effect groups in the order given, followed by
/// the random levels. Each species column sums to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariancePartition {
    pub components: Vec<String>,
    pub species: Vec<String>,
    pub fractions: DMatrix<f64>,
}

impl VariancePartition {
    /// Fraction of a component for a species.
    pub fn get(&self, component: &str, species: &str) -> Option<f64> {
        let c = self.components.iter().position(|n| n == component)?;
        let s = self.species.iter().position(|n| n == species)?;
        Some(self.fractions[(c, s)])
    }

    /// Mean fraction of each component over species.
    pub fn mean_over_species(&self) -> Vec<f64> {
        self.fractions.row_iter().map(|r| r.mean()).collect()
    }
}

/// Map each group to coefficient indices, checking that the groups cover
/// every coefficient exactly once.
fn resolve_groups(coefficients: &[String], groups: &[VarianceGroup]) -> Result<Vec<Vec<usize>>> {
    if groups.is_empty() {
        return Err(JsdmError::Spec("No variance partitioning groups given".to_string()));
    }
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(groups.len());
    for group in groups {
        if group.columns.is_empty() {
            return Err(JsdmError::Spec(format!("Variance group '{}' is empty", group.name)));
        }
        let mut indices = Vec::with_capacity(group.columns.len());
        for col in &group.columns {
            let idx = coefficients.iter().position(|c| c == col).ok_or_else(|| {
                JsdmError::Spec(format!(
                    "Variance group '{}' names unknown column '{}'",
                    group.name, col
                ))
            })?;
            if !seen.insert(idx) {
                return Err(JsdmError::Spec(format!(
                    "Column '{}' appears in more than one variance group",
                    col
                )));
            }
            indices.push(idx);
        }
        resolved.push(indices);
    }
    if let Some(missing) = coefficients.iter().enumerate().find(|(i, _)| !seen.contains(i)) {
        return Err(JsdmError::Spec(format!(
            "Column '{}' is not assigned to any variance group",
            missing.1
        )));
    }
    Ok(resolved)
}

fn variance(v: &DVector<f64>) -> f64 {
    let n = v.len();
    if n < 2 {
        return 0.0;
    }
    let mean = v.mean();
    v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Partition explained variance of every species, averaged over draws.
///
/// Per draw, the variance of the full fixed linear predictor is split across
/// groups in proportion to each group's own linear-predictor variance; each
/// random level contributes the variance of its effect across units.
pub fn partition_variance(model: &FittedModel, groups: &[VarianceGroup]) -> Result<VariancePartition> {
    let config = model.config();
    let coefficients = config.coefficient_names();
    let resolved = resolve_groups(&coefficients, groups)?;
    let levels = &config.random_levels().levels;
    let n_components = groups.len() + levels.len();
    let species = config.response().species().to_vec();

    let mut sums = DMatrix::zeros(n_components, species.len());
    let post = model.posterior();
    for draw in post.iter() {
        for (j, name) in species.iter().enumerate() {
            let x = config.design(j).matrix();
            let beta = draw.beta.column(j);
            let total_fixed = variance(&(x * beta));

            let group_vars: Vec<f64> = resolved
                .iter()
                .map(|idx| {
                    let lp = DVector::from_fn(x.nrows(), |i, _| {
                        idx.iter().map(|&c| x[(i, c)] * beta[c]).sum()
                    });
                    variance(&lp)
                })
                .collect();
            let group_sum: f64 = group_vars.iter().sum();

            let random_vars: Vec<f64> = levels
                .iter()
                .zip(&draw.random)
                .map(|(level, effects)| {
                    let u = DVector::from_iterator(
                        level.n_units(),
                        level.unit_levels.iter().map(|&l| effects[(l, j)]),
                    );
                    variance(&u)
                })
                .collect();

            let total = total_fixed + random_vars.iter().sum::<f64>();
            if !(total > 0.0 && total.is_finite()) {
                return Err(JsdmError::Numerical(format!(
                    "species '{}' has no explained variance to partition",
                    name
                )));
            }

            for (k, gv) in group_vars.iter().enumerate() {
                let share = if group_sum > 0.0 { gv / group_sum } else { 0.0 };
                sums[(k, j)] += total_fixed * share / total;
            }
            for (r, rv) in random_vars.iter().enumerate() {
                sums[(groups.len() + r, j)] += rv / total;
            }
        }
    }

    let components = groups
        .iter()
        .map(|g| g.name.clone())
        .chain(levels.iter().map(|l| format!("random: {}", l.name)))
        .collect();

    Ok(VariancePartition {
        components,
        species,
        fractions: sums / post.n_draws() as f64,
    })
}
