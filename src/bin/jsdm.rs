//! jsdm - joint species distribution model pipeline CLI
//!
//! Command-line interface for preparing survey data, fitting and reporting
//! hierarchical joint species distribution models.

use clap::{Parser, Subcommand};
use composable_jsdm::diagnostics::{AssociationMatrix, DEFAULT_SUPPORT_LEVEL};
use composable_jsdm::error::Result;
use composable_jsdm::fit::FittedModel;
use composable_jsdm::pipeline::{analyze, Pipeline, PipelineConfig};
use composable_jsdm::report::write_associations;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Joint species distribution model pipeline
#[derive(Parser)]
#[command(name = "jsdm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a YAML configuration file
    Run {
        /// Path to pipeline configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Override the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the sampling seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the association support level
        #[arg(long)]
        support_level: Option<f64>,
    },

    /// Write an example pipeline configuration
    Example {
        /// Output path for the YAML file
        #[arg(short, long, default_value = "pipeline.yaml")]
        output: PathBuf,
    },

    /// Recompute diagnostics from a saved model
    Diagnose {
        /// Pipeline configuration providing variance groups and thresholds
        #[arg(short, long)]
        config: PathBuf,

        /// Saved model (model.json)
        #[arg(short, long)]
        model: PathBuf,

        /// Output directory for the tables
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show residual associations of a saved model
    Associations {
        /// Saved model (model.json)
        #[arg(short, long)]
        model: PathBuf,

        /// Posterior sign support required to keep an association
        #[arg(long, default_value_t = DEFAULT_SUPPORT_LEVEL)]
        support_level: f64,

        /// Also write the association table to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "composable_jsdm=info,jsdm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            seed,
            support_level,
        } => cmd_run(&config, output, seed, support_level),
        Commands::Example { output } => cmd_example(&output),
        Commands::Diagnose {
            config,
            model,
            output,
        } => cmd_diagnose(&config, &model, &output),
        Commands::Associations {
            model,
            support_level,
            output,
        } => cmd_associations(&model, support_level, output.as_ref()),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(if e.is_precondition() { 2 } else { 1 });
    }
}

/// Run a pipeline from configuration
fn cmd_run(
    config_path: &PathBuf,
    output: Option<PathBuf>,
    seed: Option<u64>,
    support_level: Option<f64>,
) -> Result<()> {
    let pipeline = Pipeline::from_file(config_path)?;
    let mut config = pipeline.config().clone();
    if let Some(dir) = output {
        // relative to the working directory, not the config file
        config.output_dir = std::env::current_dir()?.join(dir);
    }
    if let Some(seed) = seed {
        config.sampling.seed = seed;
    }
    if let Some(level) = support_level {
        config.support_level = level;
    }
    let pipeline = match config_path.parent() {
        Some(dir) => Pipeline::new(config).base_dir(dir),
        None => Pipeline::new(config),
    };

    let out = pipeline.run()?;
    println!("Wrote results to {}", out.output_dir.display());
    println!(
        "  mean R²: {:.3}, convergence warnings: {}",
        out.analysis.model_fit.mean_r_squared(),
        out.analysis.warnings.len()
    );
    Ok(())
}

/// Generate example pipeline configuration
fn cmd_example(output_path: &PathBuf) -> Result<()> {
    let yaml = PipelineConfig::example().to_yaml()?;
    std::fs::write(output_path, &yaml)?;
    info!(path = %output_path.display(), "wrote example pipeline");
    println!("{}", yaml);
    Ok(())
}

fn cmd_diagnose(config_path: &PathBuf, model_path: &PathBuf, output: &PathBuf) -> Result<()> {
    let config = PipelineConfig::from_file(config_path)?;
    let model = FittedModel::load(model_path)?;
    let analysis = analyze(
        &model,
        &config.variance_groups,
        config.support_level,
        &config.convergence,
    )?;
    analysis.write(output, &model)?;
    for w in &analysis.warnings {
        println!("warning: {}", w);
    }
    println!("Wrote diagnostics to {}", output.display());
    Ok(())
}

fn cmd_associations(model_path: &PathBuf, support_level: f64, output: Option<&PathBuf>) -> Result<()> {
    let model = FittedModel::load(model_path)?;
    let assoc = AssociationMatrix::compute(&model);
    let pairs = assoc.supported_pairs(support_level)?;

    println!("Associations with support > {:.2}:", support_level);
    if pairs.is_empty() {
        println!("  (none)");
    }
    for (a, b, r) in &pairs {
        println!("  {:<20} {:<20} {:+.3}", a, b, r);
    }
    if let Some(path) = output {
        write_associations(path, &assoc, support_level)?;
        info!(path = %path.display(), "wrote association table");
    }
    Ok(())
}
