//! Trace export: every retained draw of a parameter group, one row per draw.

use crate::error::{JsdmError, Result};
use crate::fit::{Draw, FittedModel, ParameterGroup};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

type Extractor = Box<dyn Fn(&Draw) -> Vec<f64>>;

/// Column names and per-draw extractor of a parameter group.
fn columns(model: &FittedModel, group: ParameterGroup) -> Result<(Vec<String>, Extractor)> {
    let config = model.config();
    let species = config.response().species().to_vec();
    let m = species.len();
    match group {
        ParameterGroup::Beta => {
            let coefs = config.coefficient_names();
            let names = species
                .iter()
                .flat_map(|s| coefs.iter().map(move |c| format!("beta[{}, {}]", c, s)))
                .collect();
            let p = coefs.len();
            let extract: Extractor = Box::new(move |d: &Draw| {
                (0..m)
                    .flat_map(|j| (0..p).map(move |c| (c, j)))
                    .map(|(c, j)| d.beta[(c, j)])
                    .collect()
            });
            Ok((names, extract))
        }
        ParameterGroup::Sigma => {
            let mut names = Vec::new();
            let mut pairs = Vec::new();
            for a in 0..m {
                for b in a..m {
                    names.push(format!("sigma[{}, {}]", species[a], species[b]));
                    pairs.push((a, b));
                }
            }
            let extract: Extractor =
                Box::new(move |d: &Draw| pairs.iter().map(|&(a, b)| d.sigma[(a, b)]).collect());
            Ok((names, extract))
        }
        ParameterGroup::Random(level) => {
            let lvl = config.random_levels().levels.get(level).ok_or_else(|| {
                JsdmError::InvalidParameter(format!("no random level with index {}", level))
            })?;
            let ids = lvl.level_ids.clone();
            let names = species
                .iter()
                .flat_map(|s| ids.iter().map(move |id| format!("{}[{}, {}]", lvl.name, id, s)))
                .collect();
            let n_levels = ids.len();
            let extract: Extractor = Box::new(move |d: &Draw| {
                (0..m)
                    .flat_map(|j| (0..n_levels).map(move |l| (l, j)))
                    .map(|(l, j)| d.random[level][(l, j)])
                    .collect()
            });
            Ok((names, extract))
        }
    }
}

/// Write the trace of `group` as TSV with `chain` and `draw` columns.
pub fn write_trace<P: AsRef<Path>>(path: P, model: &FittedModel, group: ParameterGroup) -> Result<()> {
    let (names, extract) = columns(model, group)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "chain\tdraw\t{}", names.join("\t"))?;
    for (c, chain) in model.posterior().chains.iter().enumerate() {
        for (s, draw) in chain.iter().enumerate() {
            let values: Vec<String> = extract(draw).iter().map(|v| format!("{:.6}", v)).collect();
            writeln!(writer, "{}\t{}\t{}", c + 1, s + 1, values.join("\t"))?;
        }
    }
    writer.flush()?;
    Ok(())
}
