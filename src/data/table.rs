//! Observation tables loaded from delimited survey files.

use crate::data::{CovariateTable, ResponseMatrix};
use crate::error::{JsdmError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// A single cell value, either categorical or continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical value with a string level.
    Categorical(String),
    /// Continuous numeric value.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Render as a level label, used for grouping keys.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(x) => Some(x.to_string()),
            Variable::Missing => None,
        }
    }
}

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Options controlling how a delimited file is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Field delimiter (e.g. `b','` or `b'\t'`).
    pub delimiter: u8,
    /// Name of the grouping key column (e.g. `plot`). Must exist in the header.
    pub key_column: String,
}

impl LoadOptions {
    /// Comma-delimited input with the given key column.
    pub fn csv(key_column: &str) -> Self {
        Self {
            delimiter: b',',
            key_column: key_column.to_string(),
        }
    }

    /// Tab-delimited input with the given key column.
    pub fn tsv(key_column: &str) -> Self {
        Self {
            delimiter: b'\t',
            key_column: key_column.to_string(),
        }
    }
}

/// `NA`, empty cells and numbers that parse as non-finite (`nan`, `inf`).
fn is_missing_token(raw: &str) -> bool {
    raw.is_empty()
        || raw == "NA"
        || raw == "na"
        || raw.parse::<f64>().map_or(false, |x| !x.is_finite())
}

/// Observations for a set of sampling units (plants or plots).
///
/// Rows are sampling units; columns are stored in file order. One column is
/// designated the grouping key. Column types are inferred on load: a column
/// is continuous when every non-missing cell parses as a number.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    key_column: String,
    column_names: Vec<String>,
    column_types: Vec<VariableType>,
    columns: Vec<Vec<Variable>>,
}

impl ObservationTable {
    /// Build a table from in-memory columns, inferring each column's type.
    pub fn from_columns(key_column: &str, columns: Vec<(String, Vec<Variable>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for (name, values) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(JsdmError::InvalidParameter(format!(
                    "Duplicate column name '{}'",
                    name
                )));
            }
            if values.len() != n_rows {
                return Err(JsdmError::InvalidParameter(format!(
                    "Column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    n_rows
                )));
            }
        }
        if !seen.contains(key_column) {
            return Err(JsdmError::MissingColumn(key_column.to_string()));
        }

        let column_types = columns
            .iter()
            .map(|(_, values)| {
                if values.iter().any(|v| matches!(v, Variable::Categorical(_))) {
                    VariableType::Categorical
                } else {
                    VariableType::Continuous
                }
            })
            .collect();
        let (column_names, columns) = columns.into_iter().unzip();

        Ok(Self {
            key_column: key_column.to_string(),
            column_names,
            column_types,
            columns,
        })
    }

    /// Load a table from a delimited file with a header row.
    ///
    /// Fails with [`JsdmError::Load`] if the file cannot be read, rows are
    /// ragged, the header is empty or duplicated, there are no data rows, or
    /// the key column is absent.
    pub fn from_delimited<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_path(path)
            .map_err(|e| JsdmError::load(&source, e.to_string()))?;

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| JsdmError::load(&source, e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if header.is_empty() || header.iter().all(|h| h.is_empty()) {
            return Err(JsdmError::load(&source, "empty header row"));
        }
        let mut seen = HashSet::new();
        for name in &header {
            if !seen.insert(name.as_str()) {
                return Err(JsdmError::load(
                    &source,
                    format!("duplicate column '{}'", name),
                ));
            }
        }
        if !seen.contains(options.key_column.as_str()) {
            return Err(JsdmError::load(
                &source,
                format!("grouping key column '{}' not found", options.key_column),
            ));
        }

        // First pass: collect raw strings so types can be inferred per column
        let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); header.len()];
        for (row_idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                JsdmError::load(&source, format!("row {}: {}", row_idx + 1, e))
            })?;
            for (col_idx, field) in record.iter().enumerate() {
                raw_columns[col_idx].push(field.trim().to_string());
            }
        }
        if raw_columns[0].is_empty() {
            return Err(JsdmError::load(&source, "no data rows"));
        }

        let mut column_types = Vec::with_capacity(header.len());
        let mut columns = Vec::with_capacity(header.len());
        for raw in raw_columns {
            let numeric = raw
                .iter()
                .all(|v| is_missing_token(v) || v.parse::<f64>().is_ok());
            let values: Vec<Variable> = raw
                .into_iter()
                .map(|v| {
                    if is_missing_token(&v) {
                        Variable::Missing
                    } else if numeric {
                        v.parse::<f64>()
                            .map(Variable::Continuous)
                            .unwrap_or(Variable::Missing)
                    } else {
                        Variable::Categorical(v)
                    }
                })
                .collect();
            column_types.push(if numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            });
            columns.push(values);
        }

        let table = Self {
            key_column: options.key_column.clone(),
            column_names: header,
            column_types,
            columns,
        };
        debug!(
            path = %source,
            rows = table.n_rows(),
            columns = table.n_columns(),
            "loaded observation table"
        );
        Ok(table)
    }

    /// Load a tab-delimited file.
    pub fn from_tsv<P: AsRef<Path>>(path: P, key_column: &str) -> Result<Self> {
        Self::from_delimited(path, &LoadOptions::tsv(key_column))
    }

    /// Number of rows (sampling units).
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of columns, including the key column.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Column names in file order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Name of the grouping key column.
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == column)
    }

    /// Inferred type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.position(column).map(|i| self.column_types[i])
    }

    /// All values of a column.
    pub fn column(&self, column: &str) -> Result<&[Variable]> {
        self.position(column)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| JsdmError::MissingColumn(column.to_string()))
    }

    /// Values of a continuous column, `None` where missing.
    pub fn numeric_column(&self, column: &str) -> Result<Vec<Option<f64>>> {
        if self.column_type(column) == Some(VariableType::Categorical) {
            return Err(JsdmError::InvalidParameter(format!(
                "Column '{}' is categorical, expected numeric values",
                column
            )));
        }
        Ok(self.column(column)?.iter().map(|v| v.as_continuous()).collect())
    }

    /// Grouping key labels, one per row.
    pub fn key_values(&self) -> Vec<Option<String>> {
        self.column(&self.key_column)
            .map(|values| values.iter().map(|v| v.as_label()).collect())
            .unwrap_or_default()
    }

    /// Sorted unique labels of a column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let mut levels: Vec<String> = self
            .column(column)?
            .iter()
            .filter_map(|v| v.as_label())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort();
        Ok(levels)
    }

    /// A new table containing only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self> {
        let n = self.n_rows();
        if let Some(&bad) = rows.iter().find(|&&r| r >= n) {
            return Err(JsdmError::InvalidParameter(format!(
                "Row index {} out of bounds for {} rows",
                bad, n
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
            .collect();
        Ok(Self {
            key_column: self.key_column.clone(),
            column_names: self.column_names.clone(),
            column_types: self.column_types.clone(),
            columns,
        })
    }

    /// Exclude every row with a missing value in any of the named columns.
    pub fn drop_missing(&self, columns: &[&str]) -> Result<Self> {
        let cols: Vec<&[Variable]> = columns
            .iter()
            .map(|c| self.column(c))
            .collect::<Result<_>>()?;
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&r| cols.iter().all(|c| !c[r].is_missing()))
            .collect();
        if keep.len() < self.n_rows() {
            debug!(
                dropped = self.n_rows() - keep.len(),
                "excluded rows with missing values"
            );
        }
        self.select_rows(&keep)
    }

    /// A copy with a numeric column replaced, or appended if absent.
    pub fn with_numeric_column(&self, column: &str, values: Vec<Option<f64>>) -> Result<Self> {
        if values.len() != self.n_rows() {
            return Err(JsdmError::InvalidParameter(format!(
                "Column '{}' has {} rows, expected {}",
                column,
                values.len(),
                self.n_rows()
            )));
        }
        let values: Vec<Variable> = values
            .into_iter()
            .map(|v| v.map(Variable::Continuous).unwrap_or(Variable::Missing))
            .collect();
        let mut out = self.clone();
        match out.position(column) {
            Some(i) => {
                out.columns[i] = values;
                out.column_types[i] = VariableType::Continuous;
            }
            None => {
                out.column_names.push(column.to_string());
                out.column_types.push(VariableType::Continuous);
                out.columns.push(values);
            }
        }
        Ok(out)
    }

    /// Extract numeric columns as a dense covariate table.
    ///
    /// Covariates may not contain missing values; use [`Self::drop_missing`]
    /// first.
    pub fn to_covariates(&self, columns: &[&str]) -> Result<CovariateTable> {
        let mut data = Vec::with_capacity(columns.len());
        for &name in columns {
            let values = self.numeric_column(name)?;
            let dense: Vec<f64> = values
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| {
                        JsdmError::Spec(format!(
                            "Covariate '{}' is missing at row {}; exclude incomplete rows first",
                            name, row
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            data.push((name.to_string(), dense));
        }
        if data.is_empty() {
            // keep the unit count for intercept-only models
            return CovariateTable::from_matrix(DMatrix::zeros(self.n_rows(), 0), Vec::new());
        }
        CovariateTable::from_columns(data)
    }

    /// Extract numeric columns as a response matrix (one column per species).
    pub fn to_response(&self, species: &[&str]) -> Result<ResponseMatrix> {
        let columns = species
            .iter()
            .map(|&name| Ok((name.to_string(), self.numeric_column(name)?)))
            .collect::<Result<Vec<_>>>()?;
        ResponseMatrix::from_columns(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "plot,species,plant_height,flowers_open,fruits").unwrap();
        writeln!(file, "1,morio,12.5,4,3").unwrap();
        writeln!(file, "1,morio,10.0,2,NA").unwrap();
        writeln!(file, "2,mascula,15.2,6,5").unwrap();
        writeln!(file, "3,sambucina,9.8,,1").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();

        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.n_columns(), 5);
        assert_eq!(
            table.column_names(),
            &["plot", "species", "plant_height", "flowers_open", "fruits"]
        );
        assert_eq!(table.key_column(), "plot");
    }

    #[test]
    fn test_type_inference() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();

        assert_eq!(table.column_type("species"), Some(VariableType::Categorical));
        assert_eq!(table.column_type("plant_height"), Some(VariableType::Continuous));
        assert_eq!(table.column_type("plot"), Some(VariableType::Continuous));
    }

    #[test]
    fn test_missing_values() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();

        let fruits = table.numeric_column("fruits").unwrap();
        assert_eq!(fruits, vec![Some(3.0), None, Some(5.0), Some(1.0)]);
        let flowers = table.numeric_column("flowers_open").unwrap();
        assert_eq!(flowers[3], None);
    }

    #[test]
    fn test_drop_missing() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();

        let complete = table.drop_missing(&["fruits", "flowers_open"]).unwrap();
        assert_eq!(complete.n_rows(), 2);
        assert_eq!(complete.key_values(), vec![Some("1".to_string()), Some("2".to_string())]);
        // Input untouched
        assert_eq!(table.n_rows(), 4);
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = ObservationTable::from_delimited(
            "/definitely/not/here.csv",
            &LoadOptions::csv("plot"),
        )
        .unwrap_err();
        assert!(matches!(err, JsdmError::Load { .. }));
    }

    #[test]
    fn test_missing_key_column_is_load_error() {
        let file = create_test_csv();
        let err = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("site")).unwrap_err();
        assert!(matches!(err, JsdmError::Load { .. }));
    }

    #[test]
    fn test_ragged_rows_are_load_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "plot,height").unwrap();
        writeln!(file, "1,2.0").unwrap();
        writeln!(file, "2,3.0,99").unwrap();
        file.flush().unwrap();

        let err = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap_err();
        assert!(matches!(err, JsdmError::Load { .. }));
    }

    #[test]
    fn test_tsv_loader() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "plot\theight").unwrap();
        writeln!(file, "A\t2.0").unwrap();
        writeln!(file, "B\t3.5").unwrap();
        file.flush().unwrap();

        let table = ObservationTable::from_tsv(file.path(), "plot").unwrap();
        assert_eq!(table.levels("plot").unwrap(), vec!["A", "B"]);
        assert_eq!(table.numeric_column("height").unwrap(), vec![Some(2.0), Some(3.5)]);
    }

    #[test]
    fn test_to_covariates_rejects_missing() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();

        assert!(matches!(
            table.to_covariates(&["flowers_open"]),
            Err(JsdmError::Spec(_))
        ));
        let cov = table.to_covariates(&["plant_height"]).unwrap();
        assert_eq!(cov.n_rows(), 4);
    }

    #[test]
    fn test_numeric_column_rejects_categorical() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();
        assert!(table.numeric_column("species").is_err());
        assert!(matches!(
            table.numeric_column("nope"),
            Err(JsdmError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_to_covariates_without_columns_keeps_rows() {
        let file = create_test_csv();
        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();
        let cov = table.to_covariates(&[]).unwrap();
        assert_eq!(cov.n_rows(), 4);
        assert_eq!(cov.n_columns(), 0);
    }

    #[test]
    fn test_non_finite_cells_are_missing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "plot,height").unwrap();
        writeln!(file, "1,2.0").unwrap();
        writeln!(file, "2,nan").unwrap();
        writeln!(file, "3,inf").unwrap();
        writeln!(file, "4,-Infinity").unwrap();
        file.flush().unwrap();

        let table = ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap();
        assert_eq!(table.column_type("height"), Some(VariableType::Continuous));
        assert_eq!(
            table.numeric_column("height").unwrap(),
            vec![Some(2.0), None, None, None]
        );
        assert_eq!(table.drop_missing(&["height"]).unwrap().n_rows(), 1);
    }
}
