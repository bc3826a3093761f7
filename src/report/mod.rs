//! Tab-separated output of diagnostics and posterior traces.

mod tables;
mod trace;

pub use tables::{
    write_associations, write_convergence, write_model_fit, write_parameters,
    write_variance_partition,
};
pub use trace::write_trace;
