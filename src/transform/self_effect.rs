//! Per-species covariates that separate a species' own measurement from
//! those of the other species.
//!
//! A wide table holds one column per taxon (e.g. open flowers of each
//! species in the plot). For focal taxon `i` the heterospecific covariates
//! are the wide columns with column `i` zeroed, and the conspecific value is
//! moved to a column with a fixed name, so the same predictor name means
//! "own effect" for every species.

use crate::data::{CovariateSpec, CovariateTable};
use crate::error::{JsdmError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Zero the focal taxon's column and expose its values as `own_name`.
///
/// The returned table has the wide table's columns (column `taxon_index`
/// all zero) followed by `own_name` holding the original values of that
/// column.
pub fn zero_out_self(
    wide: &CovariateTable,
    taxon_index: usize,
    own_name: &str,
) -> Result<CovariateTable> {
    let names = wide.column_names();
    let taxon = names.get(taxon_index).ok_or_else(|| {
        JsdmError::InvalidParameter(format!(
            "Taxon index {} out of range for {} columns",
            taxon_index,
            names.len()
        ))
    })?;
    if wide.has_column(own_name) {
        return Err(JsdmError::InvalidParameter(format!(
            "Own-effect column '{}' collides with a taxon column",
            own_name
        )));
    }

    let own = wide.column(taxon)?;
    wide.with_column(taxon, &vec![0.0; wide.n_rows()])?
        .with_column(own_name, &own)
}

/// Build one covariate table per taxon of the wide table.
///
/// Each table is `base` followed by [`zero_out_self`] applied for that
/// taxon; tables are keyed by the wide table's column names and all share
/// `base`'s row order. A `base` without columns contributes nothing.
pub fn per_species_covariates(
    base: &CovariateTable,
    wide: &CovariateTable,
    own_name: &str,
) -> Result<CovariateSpec> {
    if base.n_columns() > 0 && base.n_rows() != wide.n_rows() {
        return Err(JsdmError::Spec(format!(
            "Per-species trait table has {} rows but base covariates have {}",
            wide.n_rows(),
            base.n_rows()
        )));
    }

    let mut tables = BTreeMap::new();
    for (i, taxon) in wide.column_names().iter().enumerate() {
        let own = zero_out_self(wide, i, own_name)?;
        let table = if base.n_columns() == 0 {
            own
        } else {
            base.hstack(&own)?
        };
        tables.insert(taxon.clone(), table);
    }
    debug!(
        taxa = tables.len(),
        own = own_name,
        "built per-species covariate tables"
    );
    Ok(CovariateSpec::PerResponse(tables))
}
