//! Integration tests for the orchid survey pipeline.

use approx::assert_relative_eq;
use composable_jsdm::prelude::*;
use composable_jsdm::transform::{expm1_values, log1p_values};
use nalgebra::DMatrix;
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const SPECIES: [&str; 3] = ["morio", "sambucina", "mascula"];
const PREDICTORS: [&str; 2] = ["plant_height", "flowers_open"];

const ORCHIDS_CSV: &str = "\
plot,plant_height,flowers_open,morio,sambucina,mascula
1,12.5,4,3.0,0.0,1.0
1,10.0,2,1.0,2.0,0.0
1,14.1,5,4.0,1.0,2.0
2,15.2,6,5.0,0.0,3.0
2,9.8,1,0.0,3.0,1.0
2,11.3,3,2.0,1.0,0.0
3,13.7,4,3.0,2.0,2.0
3,8.9,0,1.0,4.0,1.0
3,12.0,3,2.0,1.0,1.0
";

fn write_orchids() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", ORCHIDS_CSV).unwrap();
    file
}

fn load_orchids() -> ObservationTable {
    let file = write_orchids();
    ObservationTable::from_delimited(file.path(), &LoadOptions::csv("plot")).unwrap()
}

fn build_orchid_config(table: &ObservationTable) -> ModelConfig {
    ModelSpecBuilder::new(table.to_response(&SPECIES).unwrap())
        .shared_covariates(table.to_covariates(&PREDICTORS).unwrap())
        .predictors(&PREDICTORS)
        .random_level(RandomLevel::from_table(table, "plot").unwrap())
        .distribution(Distribution::Normal)
        .build()
        .unwrap()
}

fn quick_params(seed: u64) -> SamplingParams {
    SamplingParams {
        samples: 100,
        chains: 2,
        thin: 1,
        transient: 10,
        seed,
    }
}

#[test]
fn test_orchid_configuration_validates() {
    let table = load_orchids();
    assert_eq!(table.n_rows(), 9);

    let config = build_orchid_config(&table);
    assert_eq!(config.n_units(), 9);
    assert_eq!(config.n_species(), 3);
    assert_eq!(
        config.coefficient_names(),
        vec!["(Intercept)", "plant_height", "flowers_open"]
    );
    let plot = &config.random_levels().levels[0];
    assert_eq!(plot.level_ids, vec!["1", "2", "3"]);
    assert_eq!(plot.units_per_level(), vec![3, 3, 3]);
}

#[test]
fn test_intercept_only_configuration_validates() {
    let table = load_orchids();
    let config = ModelSpecBuilder::new(table.to_response(&SPECIES).unwrap())
        .shared_covariates(table.to_covariates(&[]).unwrap())
        .random_level(RandomLevel::from_table(&table, "plot").unwrap())
        .build()
        .unwrap();
    assert_eq!(config.coefficient_names(), vec!["(Intercept)"]);
    assert_eq!(config.n_units(), 9);
}

#[test]
fn test_relativize_gives_unit_mean() {
    let table = load_orchids();
    let relative = relativize(&table, &SPECIES).unwrap();
    for species in SPECIES {
        let values: Vec<f64> = relative
            .numeric_column(species)
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert_relative_eq!(mean, 1.0, epsilon = 1e-12);
    }

    let response = table.to_response(&SPECIES).unwrap().relativize().unwrap();
    let column: Vec<f64> = response.column(0).iter().flatten().copied().collect();
    assert_relative_eq!(column.iter().sum::<f64>() / 9.0, 1.0, epsilon = 1e-12);
}

#[test]
fn test_log1p_expm1_roundtrip() {
    let values = vec![Some(0.0), Some(3.5), None, Some(120.0), Some(-0.5)];
    let back = expm1_values(&log1p_values("x", &values).unwrap());
    for (a, b) in values.iter().zip(&back) {
        match (a, b) {
            (Some(a), Some(b)) => assert_relative_eq!(*a, *b, epsilon = 1e-10),
            (None, None) => {}
            _ => panic!("missing pattern changed"),
        }
    }

    let table = load_orchids();
    let logged = log1p(&table, &["flowers_open"]).unwrap();
    let restored = expm1(&logged, &["flowers_open"]).unwrap();
    let original = table.numeric_column("flowers_open").unwrap();
    for (a, b) in original.iter().zip(restored.numeric_column("flowers_open").unwrap()) {
        assert_relative_eq!(a.unwrap(), b.unwrap(), epsilon = 1e-10);
    }
}

#[test]
fn test_log1p_below_minus_one_is_domain_error() {
    let result = log1p_values("plant_height", &[Some(1.0), Some(-1.5)]);
    assert!(matches!(result, Err(JsdmError::Domain { .. })));
}

#[test]
fn test_zero_out_self_semantics() {
    let wide = CovariateTable::from_columns(vec![
        ("morio".to_string(), vec![4.0, 0.0, 7.0]),
        ("sambucina".to_string(), vec![1.0, 2.0, 3.0]),
        ("mascula".to_string(), vec![0.0, 5.0, 6.0]),
    ])
    .unwrap();

    let own = zero_out_self(&wide, 1, "conspecific").unwrap();
    assert_eq!(own.column("sambucina").unwrap(), vec![0.0, 0.0, 0.0]);
    assert_eq!(own.column("conspecific").unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(own.column("morio").unwrap(), vec![4.0, 0.0, 7.0]);
    assert_eq!(own.column("mascula").unwrap(), vec![0.0, 5.0, 6.0]);
}

#[test]
fn test_mismatched_rows_is_spec_error() {
    let table = load_orchids();
    let short = table.select_rows(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
    let result = ModelSpecBuilder::new(table.to_response(&SPECIES).unwrap())
        .shared_covariates(short.to_covariates(&PREDICTORS).unwrap())
        .predictors(&PREDICTORS)
        .build();
    assert!(matches!(result, Err(JsdmError::Spec(_))));
}

#[test]
fn test_fit_and_variance_fractions_sum_to_one() {
    let config = build_orchid_config(&load_orchids());
    let model = fit(&ConjugateNormalSampler::default(), &config, &quick_params(1)).unwrap();
    assert_eq!(model.posterior().n_draws(), 200);

    let groups = vec![
        VarianceGroup::new("height", &["(Intercept)", "plant_height"]),
        VarianceGroup::new("display", &["flowers_open"]),
    ];
    let vp = partition_variance(&model, &groups).unwrap();
    assert_eq!(vp.components.len(), 3);
    for j in 0..3 {
        assert_relative_eq!(vp.fractions.column(j).sum(), 1.0, epsilon = 1e-9);
    }

    let report = ConvergenceReport::compute(&model);
    // 3 coefficients x 3 species plus 6 covariance entries
    assert_eq!(report.entries.len(), 15);
    assert!(report.entries.iter().all(|e| e.ess > 0.0 && e.psrf.is_some()));
}

#[test]
fn test_association_support_filter() {
    let species = ["morio", "sambucina", "mascula"];
    let mean = DMatrix::from_row_slice(3, 3, &[1.0, 0.35, -0.2, 0.35, 1.0, 0.1, -0.2, 0.1, 1.0]);
    let positive = DMatrix::from_row_slice(3, 3, &[1.0, 0.70, 0.40, 0.70, 1.0, 0.55, 0.40, 0.55, 1.0]);
    let negative = DMatrix::from_row_slice(3, 3, &[0.0, 0.30, 0.60, 0.30, 0.0, 0.40, 0.60, 0.40, 0.0]);

    let filtered = filter_by_support(&mean, &positive, &negative, 0.65).unwrap();
    // morio-sambucina: positive support 0.70 > 0.65
    assert_relative_eq!(filtered[(0, 1)], 0.35);
    // sambucina-mascula: 0.55 positive, 0.40 negative
    assert_relative_eq!(filtered[(1, 2)], 0.0);
    // morio-mascula: 0.40 positive, 0.60 negative
    assert_relative_eq!(filtered[(0, 2)], 0.0);
    for i in 0..species.len() {
        assert_relative_eq!(filtered[(i, i)], 1.0);
    }
}

/// Sampler that returns a fixed posterior, standing in for an external engine.
struct FixedSampler;

impl Sampler for FixedSampler {
    fn name(&self) -> &str {
        "fixed"
    }

    fn sample(&self, config: &ModelConfig, params: &SamplingParams) -> Result<FittedModel> {
        let p = config.n_coefficients();
        let m = config.n_species();
        let chains = (0..params.chains)
            .map(|c| {
                (0..params.samples)
                    .map(|s| Draw {
                        beta: DMatrix::from_element(p, m, (c * params.samples + s) as f64 / 10.0),
                        random: config
                            .random_levels()
                            .levels
                            .iter()
                            .map(|l| DMatrix::zeros(l.n_levels(), m))
                            .collect(),
                        sigma: DMatrix::from_fn(m, m, |i, j| if i == j { 1.0 } else { 0.5 }),
                    })
                    .collect()
            })
            .collect();
        FittedModel::from_draws(config.clone(), *params, self.name(), PosteriorDraws::new(chains))
    }
}

#[test]
fn test_external_sampler_and_persistence() {
    let config = build_orchid_config(&load_orchids());
    let params = SamplingParams {
        samples: 5,
        chains: 2,
        thin: 1,
        transient: 0,
        seed: 0,
    };
    let model = fit(&FixedSampler, &config, &params).unwrap();
    assert_eq!(model.sampler(), "fixed");

    let assoc = AssociationMatrix::compute(&model);
    assert_relative_eq!(assoc.mean[(0, 1)], 0.5);
    assert_relative_eq!(assoc.support_positive[(0, 1)], 1.0);

    let file = NamedTempFile::new().unwrap();
    model.save(file.path()).unwrap();
    let loaded = FittedModel::load(file.path()).unwrap();
    assert_eq!(loaded.posterior().n_draws(), 10);
    assert_eq!(loaded.config().coefficient_names(), model.config().coefficient_names());
}

#[test]
fn test_unsupported_distribution_aborts_fit() {
    let table = load_orchids();
    let config = ModelSpecBuilder::new(table.to_response(&SPECIES).unwrap())
        .shared_covariates(table.to_covariates(&PREDICTORS).unwrap())
        .predictors(&PREDICTORS)
        .distribution(Distribution::Poisson)
        .build()
        .unwrap();
    let result = fit(&ConjugateNormalSampler::default(), &config, &quick_params(1));
    assert!(matches!(result, Err(JsdmError::Fit(_))));
}

#[test]
fn test_yaml_pipeline_end_to_end() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("orchids.csv"), ORCHIDS_CSV).unwrap();

    let yaml = r#"
name: orchids
input:
  path: orchids.csv
  key_column: plot
species: [morio, sambucina, mascula]
covariates: [plant_height, flowers_open]
transforms:
  - relativize: { columns: [morio, sambucina, mascula] }
formula: "~ plant_height + flowers_open + (1 | plot)"
sampling:
  samples: 60
  chains: 2
  thin: 2
  transient: 20
  seed: 9
support_level: 0.65
output_dir: results
"#;
    let config_path = dir.path().join("pipeline.yaml");
    fs::write(&config_path, yaml).unwrap();

    let output = Pipeline::from_file(&config_path).unwrap().run().unwrap();
    assert_eq!(output.output_dir, dir.path().join("results"));
    assert_eq!(output.model.posterior().n_samples(), 60);

    let associations = fs::read_to_string(output.output_dir.join("associations.tsv")).unwrap();
    // header plus three pairs
    assert_eq!(associations.lines().count(), 4);
    let trace = fs::read_to_string(output.output_dir.join("trace_beta.tsv")).unwrap();
    assert_eq!(trace.lines().count(), 121);
    let variance = fs::read_to_string(output.output_dir.join("variance_partitioning.tsv")).unwrap();
    assert!(variance.lines().any(|l| l.starts_with("random: plot")));
}

#[test]
fn test_missing_file_is_load_error() {
    let result = ObservationTable::from_delimited("/nonexistent/orchids.csv", &LoadOptions::csv("plot"));
    assert!(matches!(result, Err(JsdmError::Load { .. })));
}
