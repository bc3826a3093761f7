//! Column transforms applied before model specification.
//!
//! Every transform is pure: it returns a new table and leaves its input
//! untouched.

mod log;
mod relativize;
mod self_effect;
mod standardize;

pub use log::{expm1, expm1_values, log1p, log1p_covariates, log1p_values};
pub use relativize::{relativize, relativize_values};
pub use self_effect::{per_species_covariates, zero_out_self};
pub use standardize::{standardize, standardize_covariates, standardize_values};
