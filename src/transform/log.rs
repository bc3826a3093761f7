//! `log1p` and its inverse `expm1`.

use crate::data::{CovariateTable, ObservationTable};
use crate::error::{JsdmError, Result};

/// Apply `ln(1 + x)` to every non-missing value.
///
/// Defined for `x >= -1` (`x == -1` maps to `-inf`). Any value below -1
/// fails with [`JsdmError::Domain`].
pub fn log1p_values(column: &str, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    values
        .iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if *x < -1.0 || x.is_nan() => Err(JsdmError::domain(
                column,
                format!("log1p undefined for {} at row {} (requires x >= -1)", x, row),
            )),
            Some(x) => Ok(Some(x.ln_1p())),
            None => Ok(None),
        })
        .collect()
}

/// Apply `exp(x) - 1` to every non-missing value.
pub fn expm1_values(values: &[Option<f64>]) -> Vec<Option<f64>> {
    values.iter().map(|v| v.map(f64::exp_m1)).collect()
}

/// `log1p` on the named columns of an observation table.
///
/// Returns a new table; the input is not modified.
pub fn log1p(table: &ObservationTable, columns: &[&str]) -> Result<ObservationTable> {
    let mut out = table.clone();
    for &name in columns {
        let values = log1p_values(name, &table.numeric_column(name)?)?;
        out = out.with_numeric_column(name, values)?;
    }
    Ok(out)
}

/// `expm1` on the named columns of an observation table.
pub fn expm1(table: &ObservationTable, columns: &[&str]) -> Result<ObservationTable> {
    let mut out = table.clone();
    for &name in columns {
        let values = expm1_values(&table.numeric_column(name)?);
        out = out.with_numeric_column(name, values)?;
    }
    Ok(out)
}

/// `log1p` on the named columns of a covariate table.
pub fn log1p_covariates(table: &CovariateTable, columns: &[&str]) -> Result<CovariateTable> {
    let mut out = table.clone();
    for &name in columns {
        let values: Vec<Option<f64>> = table.column(name)?.into_iter().map(Some).collect();
        let logged: Vec<f64> = log1p_values(name, &values)?.into_iter().flatten().collect();
        out = out.with_column(name, &logged)?;
    }
    Ok(out)
}
