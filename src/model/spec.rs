//! Validated model configuration handed to a sampler.

use crate::data::{CovariateSpec, CovariateTable, Formula, RandomLevel, RandomLevelSpec, ResponseMatrix};
use crate::error::{JsdmError, Result};
use crate::model::DesignMatrix;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Observation model (noise / link) for the responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Gaussian responses, identity link.
    #[default]
    Normal,
    /// Presence/absence, probit link.
    Probit,
    /// Counts, log link.
    Poisson,
    /// Overdispersed counts, log link with normal residual.
    LognormalPoisson,
}

impl Distribution {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Probit => "probit",
            Self::Poisson => "poisson",
            Self::LognormalPoisson => "lognormal_poisson",
        }
    }
}

/// An immutable, validated model configuration.
///
/// Built only through [`ModelSpecBuilder`]; once constructed every covariate
/// table is row-aligned with the response matrix, every formula column
/// exists in every table, and every random level covers every unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    response: ResponseMatrix,
    covariates: CovariateSpec,
    formula: Formula,
    distribution: Distribution,
    random_levels: RandomLevelSpec,
    /// One design matrix per species, in response column order.
    designs: Vec<DesignMatrix>,
}

impl ModelConfig {
    pub fn response(&self) -> &ResponseMatrix {
        &self.response
    }

    pub fn covariates(&self) -> &CovariateSpec {
        &self.covariates
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    pub fn random_levels(&self) -> &RandomLevelSpec {
        &self.random_levels
    }

    /// Number of sampling units.
    pub fn n_units(&self) -> usize {
        self.response.n_units()
    }

    /// Number of species (response columns).
    pub fn n_species(&self) -> usize {
        self.response.n_species()
    }

    /// Fixed-effect coefficient names, shared by every species.
    pub fn coefficient_names(&self) -> Vec<String> {
        self.formula.coefficient_names()
    }

    /// Number of fixed-effect coefficients.
    pub fn n_coefficients(&self) -> usize {
        self.coefficient_names().len()
    }

    /// Design matrix of a species (by response column index).
    pub fn design(&self, species: usize) -> &DesignMatrix {
        &self.designs[species]
    }

    /// All design matrices in response column order.
    pub fn designs(&self) -> &[DesignMatrix] {
        &self.designs
    }
}

/// Builder for [`ModelConfig`].
///
/// # Example
/// ```no_run
/// use composable_jsdm::prelude::*;
/// # fn demo(response: ResponseMatrix, covariates: CovariateTable, plots: RandomLevel) -> Result<()> {
/// let config = ModelSpecBuilder::new(response)
///     .shared_covariates(covariates)
///     .predictors(&["plant_height", "flowers_open"])
///     .random_level(plots)
///     .distribution(Distribution::Normal)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ModelSpecBuilder {
    response: ResponseMatrix,
    covariates: Option<CovariateSpec>,
    formula: Option<Formula>,
    distribution: Distribution,
    random_levels: RandomLevelSpec,
}

impl ModelSpecBuilder {
    /// Start a configuration for a response matrix.
    pub fn new(response: ResponseMatrix) -> Self {
        Self {
            response,
            covariates: None,
            formula: None,
            distribution: Distribution::default(),
            random_levels: RandomLevelSpec::new(),
        }
    }

    /// Set the covariate specification.
    pub fn covariates(mut self, covariates: CovariateSpec) -> Self {
        self.covariates = Some(covariates);
        self
    }

    /// Use one covariate table for every species.
    pub fn shared_covariates(self, table: CovariateTable) -> Self {
        self.covariates(CovariateSpec::Shared(table))
    }

    /// Set the fixed-effects formula.
    pub fn formula(mut self, formula: Formula) -> Self {
        self.formula = Some(formula);
        self
    }

    /// Fixed effects: intercept plus one main effect per predictor.
    pub fn predictors<S: AsRef<str>>(self, predictors: &[S]) -> Self {
        self.formula(Formula::from_predictors(predictors))
    }

    /// Set the observation model.
    pub fn distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }

    /// Replace all random levels.
    pub fn random_levels(mut self, levels: RandomLevelSpec) -> Self {
        self.random_levels = levels;
        self
    }

    /// Add a random level.
    pub fn random_level(mut self, level: RandomLevel) -> Self {
        self.random_levels.levels.push(level);
        self
    }

    /// Validate and assemble the configuration.
    ///
    /// Fails with [`JsdmError::Spec`] on mismatched row counts, formula
    /// columns missing from any covariate table, species without a
    /// covariate table, or random levels that do not cover every unit.
    pub fn build(self) -> Result<ModelConfig> {
        let n_units = self.response.n_units();
        if n_units == 0 || self.response.n_species() == 0 {
            return Err(JsdmError::Spec("Response matrix is empty".to_string()));
        }

        let formula = self.formula.unwrap_or_else(|| Formula::from_predictors::<&str>(&[]));
        let covariates = match self.covariates {
            Some(c) => c,
            None if formula.variables().is_empty() => CovariateSpec::Shared(
                CovariateTable::from_matrix(DMatrix::zeros(n_units, 0), Vec::new())?,
            ),
            None => {
                return Err(JsdmError::Spec(format!(
                    "Formula '{}' references covariates but none were provided",
                    formula
                )))
            }
        };

        for (key, table) in covariates.tables() {
            let label = key.unwrap_or("shared");
            if table.n_rows() != n_units {
                return Err(JsdmError::Spec(format!(
                    "Covariate table '{}' has {} rows but the response matrix has {}",
                    label,
                    table.n_rows(),
                    n_units
                )));
            }
            if let Some(missing) = formula.variables().into_iter().find(|v| !table.has_column(v)) {
                return Err(JsdmError::Spec(format!(
                    "Predictor '{}' is missing from covariate table '{}'",
                    missing, label
                )));
            }
            if let Some(species) = key {
                if self.response.species_index(species).is_none() {
                    return Err(JsdmError::Spec(format!(
                        "Covariate table given for unknown species '{}'",
                        species
                    )));
                }
            }
        }

        let designs = self
            .response
            .species()
            .iter()
            .map(|species| {
                let table = covariates.table_for(species).ok_or_else(|| {
                    JsdmError::Spec(format!("No covariate table for species '{}'", species))
                })?;
                DesignMatrix::from_formula(table, &formula)
            })
            .collect::<Result<Vec<_>>>()?;

        self.random_levels.check_coverage(n_units)?;

        debug!(
            units = n_units,
            species = self.response.n_species(),
            coefficients = formula.coefficient_names().len(),
            levels = self.random_levels.len(),
            "model configuration validated"
        );

        Ok(ModelConfig {
            response: self.response,
            covariates,
            formula,
            distribution: self.distribution,
            random_levels: self.random_levels,
            designs,
        })
    }
}
