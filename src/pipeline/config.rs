//! YAML-serializable pipeline configuration.

use crate::diagnostics::{ConvergenceCriteria, VarianceGroup, DEFAULT_SUPPORT_LEVEL};
use crate::error::{JsdmError, Result};
use crate::fit::{ConjugateNormalConfig, SamplingParams};
use crate::model::Distribution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A column transform applied to the observation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformStep {
    /// `ln(1 + x)`.
    Log1p { columns: Vec<String> },
    /// `exp(x) - 1`.
    Expm1 { columns: Vec<String> },
    /// Divide by the column mean.
    Relativize { columns: Vec<String> },
    /// Centre and scale covariate columns.
    Standardize { columns: Vec<String> },
}

/// The delimited input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Grouping key column (sampling unit or plot identifier).
    pub key_column: String,
}

fn default_delimiter() -> char {
    ','
}

fn default_support_level() -> f64 {
    DEFAULT_SUPPORT_LEVEL
}

/// Per-species covariates with the focal species' own column separated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfEffectConfig {
    /// Species name to the input column holding that species' measurement.
    pub columns: BTreeMap<String, String>,
    /// Name of the column holding the focal species' own value.
    pub own_name: String,
}

/// Complete description of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input: InputConfig,
    /// Response columns, one per species.
    pub species: Vec<String>,
    /// Shared covariate columns.
    #[serde(default)]
    pub covariates: Vec<String>,
    #[serde(default)]
    pub self_effect: Option<SelfEffectConfig>,
    /// Applied in order after incomplete rows are dropped.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub transforms: Vec<TransformStep>,
    /// Model formula, e.g. `~ plant_height + flowers_open + (1 | plot)`.
    /// Defaults to every covariate as a main effect.
    #[serde(default)]
    pub formula: Option<String>,
    /// Random-intercept grouping columns in addition to those in the formula.
    #[serde(default)]
    pub random_levels: Vec<String>,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub sampler: ConjugateNormalConfig,
    #[serde(default = "default_support_level")]
    pub support_level: f64,
    /// Variance partitioning groups; one group per coefficient when empty.
    #[serde(default)]
    pub variance_groups: Vec<VarianceGroup>,
    #[serde(default)]
    pub convergence: ConvergenceCriteria,
    pub output_dir: PathBuf,
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())
            .map_err(|e| JsdmError::load(path.as_ref().display().to_string(), e.to_string()))?;
        Self::from_yaml(&yaml)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(JsdmError::from)
    }

    /// Check settings that can be checked without reading data.
    pub fn validate(&self) -> Result<()> {
        if self.species.is_empty() {
            return Err(JsdmError::Spec("No species columns configured".to_string()));
        }
        if !self.input.delimiter.is_ascii() {
            return Err(JsdmError::InvalidParameter(format!(
                "Delimiter '{}' must be a single ASCII character",
                self.input.delimiter
            )));
        }
        if !(0.0..=1.0).contains(&self.support_level) {
            return Err(JsdmError::InvalidParameter(format!(
                "support_level must be within [0, 1], got {}",
                self.support_level
            )));
        }
        if let Some(se) = &self.self_effect {
            if let Some(unknown) = se.columns.keys().find(|s| !self.species.contains(s)) {
                return Err(JsdmError::Spec(format!(
                    "Self-effect column given for unknown species '{}'",
                    unknown
                )));
            }
            if se.columns.len() != self.species.len() {
                return Err(JsdmError::Spec(
                    "Self-effect columns must name one column per species".to_string(),
                ));
            }
        }
        self.sampling.validate()
    }

    /// Demonstration configuration for the orchid survey layout.
    pub fn example() -> Self {
        Self {
            name: "orchid-selection".to_string(),
            description: Some(
                "Selection on plant height and floral display with plot random intercepts"
                    .to_string(),
            ),
            input: InputConfig {
                path: PathBuf::from("orchids.csv"),
                delimiter: ',',
                key_column: "plot".to_string(),
            },
            species: vec![
                "morio".to_string(),
                "sambucina".to_string(),
                "mascula".to_string(),
            ],
            covariates: vec!["plant_height".to_string(), "flowers_open".to_string()],
            self_effect: None,
            transforms: vec![
                TransformStep::Relativize {
                    columns: vec![
                        "morio".to_string(),
                        "sambucina".to_string(),
                        "mascula".to_string(),
                    ],
                },
                TransformStep::Standardize {
                    columns: vec!["plant_height".to_string(), "flowers_open".to_string()],
                },
            ],
            formula: Some("~ plant_height + flowers_open + (1 | plot)".to_string()),
            random_levels: Vec::new(),
            distribution: Distribution::Normal,
            sampling: SamplingParams::default(),
            sampler: ConjugateNormalConfig::default(),
            support_level: DEFAULT_SUPPORT_LEVEL,
            variance_groups: vec![
                VarianceGroup::new("height", &["(Intercept)", "plant_height"]),
                VarianceGroup::new("display", &["flowers_open"]),
            ],
            convergence: ConvergenceCriteria::default(),
            output_dir: PathBuf::from("results"),
        }
    }
}
