//! Fit invocation: sampling parameters, the sampler seam, posterior draws
//! and the fitted-model handle.

mod conjugate;
mod handle;
mod params;
mod posterior;
mod sampler;

pub use conjugate::{ConjugateNormalConfig, ConjugateNormalSampler};
pub use handle::FittedModel;
pub use params::SamplingParams;
pub use posterior::{Draw, ParameterGroup, PosteriorDraws};
pub use sampler::{fit, Sampler};
