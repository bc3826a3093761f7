//! Covariate tables and the shared / per-species covariate specification.

use crate::error::{JsdmError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dense numeric covariates (units × columns), no missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateTable {
    column_names: Vec<String>,
    data: DMatrix<f64>,
}

impl CovariateTable {
    /// Build from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut column_names = Vec::with_capacity(columns.len());
        for (name, values) in &columns {
            if column_names.contains(name) {
                return Err(JsdmError::InvalidParameter(format!(
                    "Duplicate covariate column '{}'",
                    name
                )));
            }
            if values.len() != n_rows {
                return Err(JsdmError::Spec(format!(
                    "Covariate column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    n_rows
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(JsdmError::domain(name, "covariate values must be finite"));
            }
            column_names.push(name.clone());
        }
        let data = DMatrix::from_fn(n_rows, columns.len(), |i, j| columns[j].1[i]);
        Ok(Self { column_names, data })
    }

    /// Build from a matrix and its column names.
    pub fn from_matrix(data: DMatrix<f64>, column_names: Vec<String>) -> Result<Self> {
        if data.ncols() != column_names.len() {
            return Err(JsdmError::Spec(format!(
                "Covariate matrix has {} columns but {} names",
                data.ncols(),
                column_names.len()
            )));
        }
        Ok(Self { column_names, data })
    }

    /// Number of rows (units).
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.data.ncols()
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|c| c == name)
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// Values of a column.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| JsdmError::MissingColumn(name.to_string()))?;
        Ok(self.data.column(idx).iter().copied().collect())
    }

    /// Underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// A copy with a column replaced, or appended if absent.
    pub fn with_column(&self, name: &str, values: &[f64]) -> Result<Self> {
        if values.len() != self.n_rows() {
            return Err(JsdmError::Spec(format!(
                "Covariate column '{}' has {} rows, expected {}",
                name,
                values.len(),
                self.n_rows()
            )));
        }
        let mut out = self.clone();
        match self.column_index(name) {
            Some(j) => {
                for (i, &v) in values.iter().enumerate() {
                    out.data[(i, j)] = v;
                }
            }
            None => {
                let j = out.data.ncols();
                out.data = out.data.insert_column(j, 0.0);
                for (i, &v) in values.iter().enumerate() {
                    out.data[(i, j)] = v;
                }
                out.column_names.push(name.to_string());
            }
        }
        Ok(out)
    }

    /// Column-wise concatenation. Row counts must match and names must not
    /// collide.
    pub fn hstack(&self, other: &CovariateTable) -> Result<Self> {
        if self.n_rows() != other.n_rows() {
            return Err(JsdmError::Spec(format!(
                "Cannot join covariate tables with {} and {} rows",
                self.n_rows(),
                other.n_rows()
            )));
        }
        let mut out = self.clone();
        for (j, name) in other.column_names.iter().enumerate() {
            if out.has_column(name) {
                return Err(JsdmError::InvalidParameter(format!(
                    "Duplicate covariate column '{}'",
                    name
                )));
            }
            let values: Vec<f64> = other.data.column(j).iter().copied().collect();
            out = out.with_column(name, &values)?;
        }
        Ok(out)
    }
}

/// Covariates for the whole response matrix.
///
/// Either one table used for every species, or one table per species when a
/// covariate's value depends on which species it is measured for (e.g. the
/// number of conspecific flowers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CovariateSpec {
    /// One table applied identically to every response column.
    Shared(CovariateTable),
    /// One table per response column, keyed by species name.
    PerResponse(BTreeMap<String, CovariateTable>),
}

impl CovariateSpec {
    /// Covariate table used for a given species.
    pub fn table_for(&self, species: &str) -> Option<&CovariateTable> {
        match self {
            CovariateSpec::Shared(table) => Some(table),
            CovariateSpec::PerResponse(tables) => tables.get(species),
        }
    }

    /// All tables with their key (`None` for the shared table).
    pub fn tables(&self) -> Vec<(Option<&str>, &CovariateTable)> {
        match self {
            CovariateSpec::Shared(table) => vec![(None, table)],
            CovariateSpec::PerResponse(tables) => tables
                .iter()
                .map(|(k, t)| (Some(k.as_str()), t))
                .collect(),
        }
    }

    /// Whether covariates vary by species.
    pub fn is_per_response(&self) -> bool {
        matches!(self, CovariateSpec::PerResponse(_))
    }
}
