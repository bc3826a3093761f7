//! Data structures for joint species distribution modelling.

mod covariates;
mod formula;
mod random_levels;
mod response;
mod table;

pub use covariates::{CovariateSpec, CovariateTable};
pub use formula::{Formula, Term, INTERCEPT};
pub use random_levels::{MixedFormula, RandomLevel, RandomLevelSpec};
pub use response::ResponseMatrix;
pub use table::{LoadOptions, ObservationTable, Variable, VariableType};
