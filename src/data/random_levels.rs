//! Random levels (grouping factors) for hierarchical models.
//!
//! Supports lme4-style syntax for declaring random intercepts inside a
//! formula:
//! - `~ plant_height + (1 | plot)` - random intercept per plot
//! - `~ height + (1 | plot) + (1 | site)` - two non-nested levels

use crate::data::{Formula, ObservationTable};
use crate::error::{JsdmError, Result};
use nalgebra::DMatrix;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parse a single `(1 | group)` block and return the grouping column name.
fn parse_random_intercept(spec: &str) -> Result<String> {
    let inner = spec
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            JsdmError::FormulaParse(format!(
                "Random level must be wrapped in parentheses: {}",
                spec
            ))
        })?;

    let parts: Vec<&str> = inner.split('|').map(str::trim).collect();
    let [terms, grouping] = parts.as_slice() else {
        return Err(JsdmError::FormulaParse(format!(
            "Random level must have exactly one '|': {}",
            spec
        )));
    };
    if grouping.is_empty() {
        return Err(JsdmError::FormulaParse(
            "Random level grouping variable cannot be empty".to_string(),
        ));
    }
    if *terms != "1" {
        return Err(JsdmError::FormulaParse(format!(
            "Only random intercepts '(1 | {})' are supported, got '{}'",
            grouping, spec
        )));
    }
    Ok(grouping.to_string())
}

/// A formula with fixed effects and random-intercept levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedFormula {
    /// Fixed effects.
    pub fixed: Formula,
    /// Grouping columns of the random levels, in order of appearance.
    pub random: Vec<String>,
}

impl MixedFormula {
    /// Parse a mixed formula.
    ///
    /// # Examples
    /// ```
    /// use composable_jsdm::data::MixedFormula;
    /// let f = MixedFormula::parse("~ plant_height + (1 | plot)").unwrap();
    /// assert_eq!(f.fixed.terms.len(), 1);
    /// assert_eq!(f.random, vec!["plot"]);
    /// ```
    pub fn parse(formula: &str) -> Result<Self> {
        let rhs = formula
            .trim()
            .strip_prefix('~')
            .ok_or_else(|| JsdmError::FormulaParse("Formula must start with '~'".to_string()))?;

        let re = Regex::new(r"\([^)]*\|[^)]*\)")
            .map_err(|e| JsdmError::FormulaParse(e.to_string()))?;
        let blocks: Vec<&str> = re.find_iter(rhs).map(|m| m.as_str()).collect();

        let mut random = Vec::new();
        for block in &blocks {
            let grouping = parse_random_intercept(block)?;
            if !random.contains(&grouping) {
                random.push(grouping);
            }
        }

        let fixed_part = re.replace_all(rhs, "");
        let fixed_terms: Vec<&str> = fixed_part
            .split('+')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let fixed = if fixed_terms.is_empty() {
            Formula::parse("~ 1")?
        } else {
            Formula::parse(&format!("~ {}", fixed_terms.join(" + ")))?
        };

        Ok(Self { fixed, random })
    }
}

impl std::fmt::Display for MixedFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fixed)?;
        for group in &self.random {
            write!(f, " + (1 | {})", group)?;
        }
        Ok(())
    }
}

/// One random level: the units' assignment to the levels of a grouping factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomLevel {
    /// Name of the grouping factor (e.g. `plot`).
    pub name: String,
    /// Unique level identifiers in first-appearance order.
    pub level_ids: Vec<String>,
    /// Level index for every unit.
    pub unit_levels: Vec<usize>,
}

impl RandomLevel {
    /// Build from per-unit labels. Every unit must carry a label.
    pub fn from_labels(name: &str, labels: &[Option<String>]) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut level_ids = Vec::new();
        let mut unit_levels = Vec::with_capacity(labels.len());

        for (row, label) in labels.iter().enumerate() {
            let label = label.as_deref().ok_or_else(|| {
                JsdmError::Spec(format!(
                    "Random level '{}' has no value for unit {}",
                    name, row
                ))
            })?;
            let idx = *index.entry(label).or_insert_with(|| {
                level_ids.push(label.to_string());
                level_ids.len() - 1
            });
            unit_levels.push(idx);
        }

        Ok(Self {
            name: name.to_string(),
            level_ids,
            unit_levels,
        })
    }

    /// Build from a column of an observation table.
    pub fn from_table(table: &ObservationTable, column: &str) -> Result<Self> {
        let labels: Vec<Option<String>> =
            table.column(column)?.iter().map(|v| v.as_label()).collect();
        Self::from_labels(column, &labels)
    }

    /// Number of units covered.
    pub fn n_units(&self) -> usize {
        self.unit_levels.len()
    }

    /// Number of distinct levels.
    pub fn n_levels(&self) -> usize {
        self.level_ids.len()
    }

    /// Number of units per level.
    pub fn units_per_level(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_levels()];
        for &idx in &self.unit_levels {
            counts[idx] += 1;
        }
        counts
    }

    /// Indicator matrix Z (units × levels), `Z[i, l] = 1` if unit i is in level l.
    pub fn design_matrix(&self) -> DMatrix<f64> {
        let mut z = DMatrix::zeros(self.n_units(), self.n_levels());
        for (unit, &level) in self.unit_levels.iter().enumerate() {
            z[(unit, level)] = 1.0;
        }
        z
    }
}

/// All random levels of a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomLevelSpec {
    pub levels: Vec<RandomLevel>,
}

impl RandomLevelSpec {
    /// No random levels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one level per grouping column of the table.
    pub fn from_table(table: &ObservationTable, columns: &[&str]) -> Result<Self> {
        let levels = columns
            .iter()
            .map(|c| RandomLevel::from_table(table, c))
            .collect::<Result<_>>()?;
        Ok(Self { levels })
    }

    /// Add a level.
    pub fn with_level(mut self, level: RandomLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether there are no random levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level names.
    pub fn names(&self) -> Vec<&str> {
        self.levels.iter().map(|l| l.name.as_str()).collect()
    }

    /// Check that every level assigns every one of `n_units` units.
    pub fn check_coverage(&self, n_units: usize) -> Result<()> {
        for level in &self.levels {
            if level.n_units() != n_units {
                return Err(JsdmError::Spec(format!(
                    "Random level '{}' covers {} units but the response matrix has {} rows",
                    level.name,
                    level.n_units(),
                    n_units
                )));
            }
        }
        Ok(())
    }
}
