//! Pipeline runner: load, transform, configure, fit, diagnose, report.

use crate::data::{
    CovariateSpec, CovariateTable, Formula, LoadOptions, MixedFormula, ObservationTable,
    RandomLevelSpec,
};
use crate::diagnostics::{
    parameter_table, partition_variance, AssociationMatrix, ConvergenceCriteria, ConvergenceReport,
    ConvergenceWarning, ModelFit, ParameterSummary, VarianceGroup, VariancePartition,
};
use crate::error::{JsdmError, Result};
use crate::fit::{fit, ConjugateNormalSampler, FittedModel, ParameterGroup};
use crate::model::{ModelConfig, ModelSpecBuilder};
use crate::pipeline::{PipelineConfig, TransformStep};
use crate::report;
use crate::transform::{expm1, log1p, per_species_covariates, relativize, standardize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File names written into the output directory.
pub const MODEL_FILE: &str = "model.json";
pub const PARAMETERS_FILE: &str = "parameters.tsv";
pub const VARIANCE_FILE: &str = "variance_partitioning.tsv";
pub const ASSOCIATIONS_FILE: &str = "associations.tsv";
pub const MODEL_FIT_FILE: &str = "model_fit.tsv";
pub const CONVERGENCE_FILE: &str = "convergence.tsv";
pub const TRACE_BETA_FILE: &str = "trace_beta.tsv";

/// Everything computed from one fitted model.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub convergence: ConvergenceReport,
    pub warnings: Vec<ConvergenceWarning>,
    pub model_fit: ModelFit,
    pub variance: VariancePartition,
    pub associations: AssociationMatrix,
    pub parameters: Vec<ParameterSummary>,
    pub support_level: f64,
}

impl Analysis {
    /// Write every table into `dir`, creating it if needed.
    pub fn write<P: AsRef<Path>>(&self, dir: P, model: &FittedModel) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        report::write_parameters(dir.join(PARAMETERS_FILE), &self.parameters)?;
        report::write_variance_partition(dir.join(VARIANCE_FILE), &self.variance)?;
        report::write_associations(dir.join(ASSOCIATIONS_FILE), &self.associations, self.support_level)?;
        report::write_model_fit(dir.join(MODEL_FIT_FILE), &self.model_fit)?;
        report::write_convergence(dir.join(CONVERGENCE_FILE), &self.convergence)?;
        report::write_trace(dir.join(TRACE_BETA_FILE), model, ParameterGroup::Beta)?;
        info!(dir = %dir.display(), "wrote reports");
        Ok(())
    }
}

/// Output of a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub model: FittedModel,
    pub analysis: Analysis,
    pub output_dir: PathBuf,
}

/// A configured analysis run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    /// Directory the input path is resolved against, if relative.
    base_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            base_dir: None,
        }
    }

    /// Load a YAML configuration; relative paths in it resolve against the
    /// file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = PipelineConfig::from_file(path.as_ref())?;
        Ok(Self {
            config,
            base_dir: path.as_ref().parent().map(Path::to_path_buf),
        })
    }

    /// Resolve relative paths against `dir`.
    pub fn base_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Output directory with relative paths resolved.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.config.output_dir)
    }

    fn formula(&self) -> Result<MixedFormula> {
        let mut mixed = match &self.config.formula {
            Some(f) => MixedFormula::parse(f)?,
            None => {
                let mut predictors = self.config.covariates.clone();
                if let Some(se) = &self.config.self_effect {
                    predictors.extend(se.columns.keys().cloned());
                    predictors.push(se.own_name.clone());
                }
                MixedFormula {
                    fixed: Formula::from_predictors(&predictors),
                    random: Vec::new(),
                }
            }
        };
        for level in &self.config.random_levels {
            if !mixed.random.contains(level) {
                mixed.random.push(level.clone());
            }
        }
        Ok(mixed)
    }

    /// Load and transform the data and build the model configuration.
    pub fn prepare(&self) -> Result<ModelConfig> {
        let cfg = &self.config;
        cfg.validate()?;
        let formula = self.formula()?;

        let input = self.resolve(&cfg.input.path);
        let options = LoadOptions {
            delimiter: cfg.input.delimiter as u8,
            key_column: cfg.input.key_column.clone(),
        };
        let table = ObservationTable::from_delimited(&input, &options)?;
        info!(
            path = %input.display(),
            rows = table.n_rows(),
            columns = table.n_columns(),
            "loaded observations"
        );

        let mut required: Vec<&str> = cfg.covariates.iter().map(String::as_str).collect();
        required.extend(formula.random.iter().map(String::as_str));
        if let Some(se) = &cfg.self_effect {
            required.extend(se.columns.values().map(String::as_str));
        }
        let mut table = table.drop_missing(&required)?;
        debug!(rows = table.n_rows(), "dropped incomplete rows");

        for step in &cfg.transforms {
            table = match step {
                TransformStep::Log1p { columns } => log1p(&table, &as_strs(columns))?,
                TransformStep::Expm1 { columns } => expm1(&table, &as_strs(columns))?,
                TransformStep::Relativize { columns } => relativize(&table, &as_strs(columns))?,
                TransformStep::Standardize { columns } => standardize(&table, &as_strs(columns))?,
            };
        }

        let response = table.to_response(&as_strs(&cfg.species))?;
        let base = table.to_covariates(&as_strs(&cfg.covariates))?;

        let covariates = match &cfg.self_effect {
            Some(se) => {
                let wide = CovariateTable::from_columns(
                    cfg.species
                        .iter()
                        .map(|sp| {
                            let column = se.columns.get(sp).ok_or_else(|| {
                                JsdmError::Spec(format!("No self-effect column for species '{}'", sp))
                            })?;
                            let values = table.to_covariates(&[column.as_str()])?.column(column)?;
                            Ok((sp.clone(), values))
                        })
                        .collect::<Result<Vec<_>>>()?,
                )?;
                per_species_covariates(&base, &wide, &se.own_name)?
            }
            None => CovariateSpec::Shared(base),
        };

        let random_names = as_strs(&formula.random);
        let levels = RandomLevelSpec::from_table(&table, &random_names)?;

        ModelSpecBuilder::new(response)
            .covariates(covariates)
            .formula(formula.fixed)
            .distribution(cfg.distribution)
            .random_levels(levels)
            .build()
    }

    /// Compute every diagnostic of a fitted model.
    pub fn analyze(&self, model: &FittedModel) -> Result<Analysis> {
        analyze(
            model,
            &self.config.variance_groups,
            self.config.support_level,
            &self.config.convergence,
        )
    }

    /// Run every stage and write the outputs.
    pub fn run(&self) -> Result<PipelineOutput> {
        info!(pipeline = %self.config.name, "starting pipeline");
        let config = self.prepare()?;
        let sampler = ConjugateNormalSampler::new(self.config.sampler)?;
        let model = fit(&sampler, &config, &self.config.sampling)?;
        let analysis = self.analyze(&model)?;

        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir)?;
        model.save(output_dir.join(MODEL_FILE))?;
        analysis.write(&output_dir, &model)?;

        info!(
            warnings = analysis.warnings.len(),
            mean_r_squared = analysis.model_fit.mean_r_squared(),
            "pipeline finished"
        );
        Ok(PipelineOutput {
            model,
            analysis,
            output_dir,
        })
    }
}

/// Diagnostics of a fitted model with explicit settings.
pub fn analyze(
    model: &FittedModel,
    variance_groups: &[VarianceGroup],
    support_level: f64,
    criteria: &ConvergenceCriteria,
) -> Result<Analysis> {
    let convergence = ConvergenceReport::compute(model);
    let warnings = convergence.check(criteria);
    let groups = if variance_groups.is_empty() {
        VarianceGroup::per_coefficient(&model.config().coefficient_names())
    } else {
        variance_groups.to_vec()
    };
    let associations = AssociationMatrix::compute(model);
    // reject a bad level before anything is written
    associations.filtered(support_level)?;

    Ok(Analysis {
        warnings,
        model_fit: ModelFit::compute(model),
        variance: partition_variance(model, &groups)?,
        parameters: parameter_table(model),
        associations,
        convergence,
        support_level,
    })
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::SamplingParams;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_data(dir: &Path) {
        let mut file = fs::File::create(dir.join("orchids.csv")).unwrap();
        writeln!(file, "plot,plant_height,flowers_open,morio,sambucina,mascula").unwrap();
        for i in 0..18 {
            let h = 10.0 + (i % 5) as f64;
            let f = (i % 4) as f64;
            writeln!(
                file,
                "{},{},{},{},{},{}",
                i % 3 + 1,
                h,
                f,
                1.0 + 0.2 * h + ((i as f64) * 1.3).sin(),
                2.0 + 0.5 * f + ((i as f64) * 0.7).cos(),
                3.0 - 0.1 * h + ((i as f64) * 2.1).sin()
            )
            .unwrap();
        }
    }

    fn create_config() -> PipelineConfig {
        let mut config = PipelineConfig::example();
        config.sampling = SamplingParams {
            samples: 50,
            chains: 2,
            thin: 1,
            transient: 5,
            seed: 42,
        };
        config
    }

    #[test]
    fn test_prepare() {
        let dir = TempDir::new().unwrap();
        write_data(dir.path());
        let pipeline = Pipeline::new(create_config()).base_dir(dir.path());

        let model_config = pipeline.prepare().unwrap();
        assert_eq!(model_config.n_units(), 18);
        assert_eq!(model_config.n_species(), 3);
        assert_eq!(model_config.random_levels().names(), vec!["plot"]);
        assert_eq!(model_config.random_levels().levels[0].n_levels(), 3);
    }

    #[test]
    fn test_run_writes_outputs() {
        let dir = TempDir::new().unwrap();
        write_data(dir.path());
        let pipeline = Pipeline::new(create_config()).base_dir(dir.path());

        let output = pipeline.run().unwrap();
        for file in [
            MODEL_FILE,
            PARAMETERS_FILE,
            VARIANCE_FILE,
            ASSOCIATIONS_FILE,
            MODEL_FIT_FILE,
            CONVERGENCE_FILE,
            TRACE_BETA_FILE,
        ] {
            assert!(output.output_dir.join(file).exists(), "missing {}", file);
        }
        assert_eq!(output.analysis.parameters.len(), 9);
        let reloaded = FittedModel::load(output.output_dir.join(MODEL_FILE)).unwrap();
        assert_eq!(reloaded.posterior().n_draws(), 100);
    }

    #[test]
    fn test_missing_input_is_load_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(create_config()).base_dir(dir.path());
        assert!(matches!(pipeline.prepare(), Err(JsdmError::Load { .. })));
    }

    #[test]
    fn test_self_effect_tables() {
        let dir = TempDir::new().unwrap();
        write_data(dir.path());
        let mut config = create_config();
        config.covariates = vec!["plant_height".to_string()];
        config.transforms.clear();
        config.formula = None;
        config.variance_groups.clear();
        config.self_effect = Some(crate::pipeline::SelfEffectConfig {
            columns: [
                ("morio", "flowers_open"),
                ("sambucina", "flowers_open"),
                ("mascula", "flowers_open"),
            ]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect(),
            own_name: "conspecific".to_string(),
        });
        let pipeline = Pipeline::new(config).base_dir(dir.path());

        let model_config = pipeline.prepare().unwrap();
        assert!(model_config.covariates().is_per_response());
        let names = model_config.coefficient_names();
        assert!(names.contains(&"conspecific".to_string()));
        assert!(names.contains(&"morio".to_string()));
    }

    #[test]
    fn test_transforms_apply_in_listed_order() {
        let dir = TempDir::new().unwrap();
        write_data(dir.path());

        // standardized heights reach about -1.29, outside the domain of log1p
        let mut config = create_config();
        config.transforms = vec![
            TransformStep::Standardize {
                columns: vec!["plant_height".to_string()],
            },
            TransformStep::Log1p {
                columns: vec!["plant_height".to_string()],
            },
        ];
        let pipeline = Pipeline::new(config).base_dir(dir.path());
        assert!(matches!(pipeline.prepare(), Err(JsdmError::Domain { .. })));

        let mut config = create_config();
        config.transforms = vec![
            TransformStep::Log1p {
                columns: vec!["plant_height".to_string()],
            },
            TransformStep::Standardize {
                columns: vec!["plant_height".to_string()],
            },
        ];
        let model_config = Pipeline::new(config).base_dir(dir.path()).prepare().unwrap();
        let design = model_config.design(0);
        let idx = design.coefficient_index("plant_height").unwrap();
        let mean = design.matrix().column(idx).mean();
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_intercept_only_with_random_level() {
        let dir = TempDir::new().unwrap();
        write_data(dir.path());
        let mut config = create_config();
        config.covariates.clear();
        config.transforms.truncate(1);
        config.formula = None;
        config.random_levels = vec!["plot".to_string()];
        config.variance_groups.clear();
        let pipeline = Pipeline::new(config).base_dir(dir.path());

        let model_config = pipeline.prepare().unwrap();
        assert_eq!(model_config.coefficient_names(), vec!["(Intercept)"]);
        assert_eq!(model_config.n_units(), 18);

        let output = pipeline.run().unwrap();
        assert_eq!(output.analysis.parameters.len(), 3);
        assert_eq!(output.analysis.associations.species.len(), 3);
    }
}
