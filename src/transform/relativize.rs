//! Mean relativization (relative fitness).

use crate::data::ObservationTable;
use crate::error::{JsdmError, Result};

/// Divide each non-missing value by the mean of the non-missing values.
///
/// Fails with [`JsdmError::Domain`] when the column has no observed values
/// or its mean is zero.
pub fn relativize_values(column: &str, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        return Err(JsdmError::domain(column, "no observed values to relativize"));
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    if mean == 0.0 || !mean.is_finite() {
        return Err(JsdmError::domain(
            column,
            format!("cannot relativize by mean {}", mean),
        ));
    }
    Ok(values.iter().map(|v| v.map(|x| x / mean)).collect())
}

/// Relativize the named columns of an observation table.
///
/// Returns a new table; the input is not modified.
pub fn relativize(table: &ObservationTable, columns: &[&str]) -> Result<ObservationTable> {
    let mut out = table.clone();
    for &name in columns {
        let values = relativize_values(name, &table.numeric_column(name)?)?;
        out = out.with_numeric_column(name, values)?;
    }
    Ok(out)
}
