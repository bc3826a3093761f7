//! Centering and scaling of covariates.

use crate::data::{CovariateTable, ObservationTable};
use crate::error::{JsdmError, Result};
use statrs::statistics::Statistics;

/// Centre the non-missing values to mean 0 and scale to unit (sample)
/// standard deviation.
///
/// Fewer than two observed values or a constant column fail with
/// [`JsdmError::Domain`].
pub fn standardize_values(column: &str, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.len() < 2 {
        return Err(JsdmError::domain(column, "need at least two observed values to standardize"));
    }
    let mean = observed.iter().mean();
    let sd = observed.iter().std_dev();
    if sd == 0.0 || !sd.is_finite() {
        return Err(JsdmError::domain(column, "zero standard deviation"));
    }
    Ok(values.iter().map(|v| v.map(|x| (x - mean) / sd)).collect())
}

/// Standardize the named columns of an observation table.
///
/// Returns a new table; the input is not modified.
pub fn standardize(table: &ObservationTable, columns: &[&str]) -> Result<ObservationTable> {
    let mut out = table.clone();
    for &name in columns {
        let values = standardize_values(name, &table.numeric_column(name)?)?;
        out = out.with_numeric_column(name, values)?;
    }
    Ok(out)
}

/// Standardize the named columns of a covariate table.
pub fn standardize_covariates(table: &CovariateTable, columns: &[&str]) -> Result<CovariateTable> {
    let mut out = table.clone();
    for &name in columns {
        let values: Vec<Option<f64>> = table.column(name)?.into_iter().map(Some).collect();
        let scaled: Vec<f64> = standardize_values(name, &values)?.into_iter().flatten().collect();
        out = out.with_column(name, &scaled)?;
    }
    Ok(out)
}
