//! Per-species response matrix (units × species).

use crate::error::{JsdmError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Responses for each monitored species across sampling units.
///
/// Stored column-wise: one column per species, one entry per unit. `None`
/// marks a species that was not present or not measured at that unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMatrix {
    species: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl ResponseMatrix {
    /// Build from named columns. All columns must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<Option<f64>>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(JsdmError::Spec(
                "Response matrix must have at least one species column".to_string(),
            ));
        }
        let n_units = columns[0].1.len();
        for (name, values) in &columns {
            if values.len() != n_units {
                return Err(JsdmError::Spec(format!(
                    "Response column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    n_units
                )));
            }
            if values.iter().flatten().any(|v| !v.is_finite()) {
                return Err(JsdmError::domain(name, "response values must be finite"));
            }
        }
        let (species, columns) = columns.into_iter().unzip();
        Ok(Self { species, columns })
    }

    /// Build from fully observed dense columns.
    pub fn from_dense(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        Self::from_columns(
            columns
                .into_iter()
                .map(|(name, v)| (name, v.into_iter().map(Some).collect()))
                .collect(),
        )
    }

    /// Species names (column order).
    pub fn species(&self) -> &[String] {
        &self.species
    }

    /// Number of species (columns).
    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    /// Number of sampling units (rows).
    pub fn n_units(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Index of a species column by name.
    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s == name)
    }

    /// Values of a species column.
    pub fn column(&self, species: usize) -> &[Option<f64>] {
        &self.columns[species]
    }

    /// Value at (unit, species).
    pub fn get(&self, unit: usize, species: usize) -> Option<f64> {
        self.columns[species][unit]
    }

    /// Number of non-missing entries in each column.
    pub fn observed_counts(&self) -> Vec<usize> {
        self.columns
            .iter()
            .map(|c| c.iter().filter(|v| v.is_some()).count())
            .collect()
    }

    /// Dense matrix with `NaN` at missing entries.
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n_units(), self.n_species(), |i, j| {
            self.columns[j][i].unwrap_or(f64::NAN)
        })
    }

    /// Relative-fitness variant: each column divided by the mean of its
    /// non-missing entries.
    pub fn relativize(&self) -> Result<Self> {
        let columns = self
            .species
            .iter()
            .zip(&self.columns)
            .map(|(name, col)| Ok((name.clone(), crate::transform::relativize_values(name, col)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns(columns)
    }

    /// `ln(1 + x)` applied to every non-missing response. A response of -1
    /// maps to `-inf` and fails with [`JsdmError::Domain`].
    pub fn log1p(&self) -> Result<Self> {
        let columns = self
            .species
            .iter()
            .zip(&self.columns)
            .map(|(name, col)| Ok((name.clone(), crate::transform::log1p_values(name, col)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_response() -> ResponseMatrix {
        ResponseMatrix::from_columns(vec![
            ("morio".to_string(), vec![Some(2.0), Some(4.0), None]),
            ("mascula".to_string(), vec![Some(1.0), Some(1.0), Some(4.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_dimensions() {
        let y = create_test_response();
        assert_eq!(y.n_species(), 2);
        assert_eq!(y.n_units(), 3);
        assert_eq!(y.species_index("mascula"), Some(1));
        assert_eq!(y.observed_counts(), vec![2, 3]);
    }

    #[test]
    fn test_to_matrix_marks_missing() {
        let y = create_test_response();
        let m = y.to_matrix();
        assert_eq!(m.shape(), (3, 2));
        assert!(m[(2, 0)].is_nan());
        assert_eq!(m[(2, 1)], 4.0);
    }

    #[test]
    fn test_relativize_keeps_missing() {
        let y = create_test_response().relativize().unwrap();
        assert_relative_eq!(y.get(0, 0).unwrap(), 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(y.get(2, 0), None);
        assert_relative_eq!(y.get(2, 1).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = ResponseMatrix::from_columns(vec![
            ("a".to_string(), vec![Some(1.0)]),
            ("b".to_string(), vec![Some(1.0), Some(2.0)]),
        ]);
        assert!(matches!(result, Err(JsdmError::Spec(_))));
    }

    #[test]
    fn test_log1p_of_minus_one_is_domain_error() {
        let y = ResponseMatrix::from_dense(vec![("morio".to_string(), vec![0.0, -1.0, 3.0])]).unwrap();
        assert!(matches!(y.log1p(), Err(JsdmError::Domain { .. })));

        let logged = create_test_response().log1p().unwrap();
        assert_relative_eq!(logged.get(0, 1).unwrap(), 2.0_f64.ln(), epsilon = 1e-12);
    }
}
