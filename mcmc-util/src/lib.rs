//! Small, dependency-light MCMC kernels shared by the samplers in this
//! workspace: scalar slice sampling, random-walk Metropolis–Hastings, and
//! thinned chain storage with posterior summaries.

pub mod chain;
pub mod metropolis;
pub mod slice;
pub mod traits;

pub use chain::McmcChain;
pub use metropolis::MetropolisSampler;
pub use slice::SliceSampler;
pub use traits::{ChainParam, ScalarSampler, ScalarStep};
