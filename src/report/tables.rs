//! TSV tables of the diagnostics.

use crate::diagnostics::{
    AssociationMatrix, ConvergenceReport, ModelFit, ParameterSummary, VariancePartition,
};
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn create<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| format!("{:.4}", v))
}

/// One row per coefficient and species.
pub fn write_parameters<P: AsRef<Path>>(path: P, rows: &[ParameterSummary]) -> Result<()> {
    let mut writer = create(path)?;
    writeln!(
        writer,
        "species\tcoefficient\tmean\tsd\tlower_2.5\tupper_97.5\tsupport_positive\tsupport_negative"
    )?;
    for r in rows {
        writeln!(
            writer,
            "{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.4}\t{:.4}",
            r.species,
            r.coefficient,
            r.mean,
            r.sd,
            r.lower,
            r.upper,
            r.support_positive,
            r.support_negative
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Components as rows, species as columns, plus the mean over species.
pub fn write_variance_partition<P: AsRef<Path>>(path: P, vp: &VariancePartition) -> Result<()> {
    let mut writer = create(path)?;
    writeln!(writer, "component\t{}\tmean", vp.species.join("\t"))?;
    let means = vp.mean_over_species();
    for (c, component) in vp.components.iter().enumerate() {
        let values: Vec<String> = vp
            .fractions
            .row(c)
            .iter()
            .map(|v| format!("{:.6}", v))
            .collect();
        writeln!(writer, "{}\t{}\t{:.6}", component, values.join("\t"), means[c])?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per species pair with the filtered value at `support_level`.
pub fn write_associations<P: AsRef<Path>>(
    path: P,
    assoc: &AssociationMatrix,
    support_level: f64,
) -> Result<()> {
    let filtered = assoc.filtered(support_level)?;
    let mut writer = create(path)?;
    writeln!(
        writer,
        "species_a\tspecies_b\tmean\tsupport_positive\tsupport_negative\tfiltered"
    )?;
    let m = assoc.species.len();
    for a in 0..m {
        for b in (a + 1)..m {
            writeln!(
                writer,
                "{}\t{}\t{:.6}\t{:.4}\t{:.4}\t{:.6}",
                assoc.species[a],
                assoc.species[b],
                assoc.mean[(a, b)],
                assoc.support_positive[(a, b)],
                assoc.support_negative[(a, b)],
                filtered[(a, b)]
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Per-species R² and RMSE with a trailing `mean` row.
pub fn write_model_fit<P: AsRef<Path>>(path: P, fit: &ModelFit) -> Result<()> {
    let mut writer = create(path)?;
    writeln!(writer, "species\tn_observed\tr_squared\trmse")?;
    for s in &fit.species {
        writeln!(
            writer,
            "{}\t{}\t{:.6}\t{:.6}",
            s.species, s.n_observed, s.r_squared, s.rmse
        )?;
    }
    writeln!(
        writer,
        "mean\t\t{:.6}\t{:.6}",
        fit.mean_r_squared(),
        fit.mean_rmse()
    )?;
    writer.flush()?;
    Ok(())
}

pub fn write_convergence<P: AsRef<Path>>(path: P, report: &ConvergenceReport) -> Result<()> {
    let mut writer = create(path)?;
    writeln!(writer, "parameter\tgroup\tess\tpsrf")?;
    for e in &report.entries {
        writeln!(
            writer,
            "{}\t{:?}\t{:.1}\t{}",
            e.parameter,
            e.group,
            e.ess,
            fmt_opt(e.psrf)
        )?;
    }
    writer.flush()?;
    Ok(())
}
