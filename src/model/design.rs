//! Fixed-effects design matrix construction from covariates and a formula.

use crate::data::{CovariateTable, Formula, Term, INTERCEPT};
use crate::error::{JsdmError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A design matrix (units × coefficients) for one response column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignMatrix {
    matrix: DMatrix<f64>,
    coefficient_names: Vec<String>,
}

impl DesignMatrix {
    /// Create a design matrix directly from components.
    pub fn from_matrix(matrix: DMatrix<f64>, coefficient_names: Vec<String>) -> Result<Self> {
        if matrix.ncols() != coefficient_names.len() {
            return Err(JsdmError::Spec(format!(
                "Design matrix has {} columns but {} coefficient names",
                matrix.ncols(),
                coefficient_names.len()
            )));
        }
        Ok(Self {
            matrix,
            coefficient_names,
        })
    }

    /// Build a design matrix from covariates and a formula.
    ///
    /// Columns are the intercept (if any), then one column per term in
    /// formula order; interaction columns are element-wise products.
    pub fn from_formula(covariates: &CovariateTable, formula: &Formula) -> Result<Self> {
        for var in formula.variables() {
            if !covariates.has_column(var) {
                return Err(JsdmError::MissingColumn(var.to_string()));
            }
        }

        let n = covariates.n_rows();
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(formula.terms.len() + 1);
        if formula.intercept {
            columns.push(vec![1.0; n]);
        }
        for term in &formula.terms {
            let col = match term {
                Term::Main(v) => covariates.column(v)?,
                Term::Interaction(a, b) => covariates
                    .column(a)?
                    .iter()
                    .zip(covariates.column(b)?)
                    .map(|(x, y)| x * y)
                    .collect(),
            };
            columns.push(col);
        }

        let matrix = DMatrix::from_fn(n, columns.len(), |i, j| columns[j][i]);
        Ok(Self {
            matrix,
            coefficient_names: formula.coefficient_names(),
        })
    }

    /// Get the design matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Get coefficient names.
    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    /// Number of units (rows).
    pub fn n_units(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of coefficients (columns).
    pub fn n_coefficients(&self) -> usize {
        self.matrix.ncols()
    }

    /// Get the index of a coefficient by name.
    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }

    /// Check if the matrix has an intercept.
    pub fn has_intercept(&self) -> bool {
        self.coefficient_names.first().map(String::as_str) == Some(INTERCEPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_covariates() -> CovariateTable {
        CovariateTable::from_columns(vec![
            ("height".to_string(), vec![25.0, 30.0, 35.0, 28.0]),
            ("flowers".to_string(), vec![0.0, 1.0, 0.0, 2.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_intercept_only() {
        let dm = DesignMatrix::from_formula(&create_test_covariates(), &Formula::parse("~ 1").unwrap()).unwrap();
        assert_eq!(dm.n_units(), 4);
        assert_eq!(dm.coefficient_names(), &[INTERCEPT]);
        assert!(dm.matrix().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_main_effects() {
        let formula = Formula::from_predictors(&["height", "flowers"]);
        let dm = DesignMatrix::from_formula(&create_test_covariates(), &formula).unwrap();

        assert_eq!(dm.coefficient_names(), &[INTERCEPT, "height", "flowers"]);
        assert!(dm.has_intercept());
        let height: Vec<f64> = (0..4).map(|i| dm.matrix()[(i, 1)]).collect();
        assert_eq!(height, vec![25.0, 30.0, 35.0, 28.0]);
    }

    #[test]
    fn test_interaction() {
        let formula = Formula::parse("~ height * flowers").unwrap();
        let dm = DesignMatrix::from_formula(&create_test_covariates(), &formula).unwrap();

        assert_eq!(dm.n_coefficients(), 4);
        let interaction: Vec<f64> = (0..4).map(|i| dm.matrix()[(i, 3)]).collect();
        assert_eq!(interaction, vec![0.0, 30.0, 0.0, 56.0]);
    }

    #[test]
    fn test_no_intercept() {
        let formula = Formula::parse("~ 0 + height").unwrap();
        let dm = DesignMatrix::from_formula(&create_test_covariates(), &formula).unwrap();
        assert!(!dm.has_intercept());
        assert_eq!(dm.coefficient_index("height"), Some(0));
    }

    #[test]
    fn test_missing_column() {
        let formula = Formula::from_predictors(&["seeds"]);
        assert!(matches!(
            DesignMatrix::from_formula(&create_test_covariates(), &formula),
            Err(JsdmError::MissingColumn(_))
        ));
    }
}
