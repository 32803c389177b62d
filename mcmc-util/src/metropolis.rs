//! Random-walk Metropolis–Hastings on a single real parameter.

use crate::traits::{ScalarSampler, ScalarStep};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Gaussian random-walk proposal `x' = x + proposal_sd * N(0, 1)`,
/// accepted with probability `min(1, exp(llik(x') - llik(x)))`.
#[derive(Debug, Clone)]
pub struct MetropolisSampler {
    pub proposal_sd: f64,
}

impl Default for MetropolisSampler {
    fn default() -> Self {
        Self { proposal_sd: 0.4 }
    }
}

impl MetropolisSampler {
    pub fn new(proposal_sd: f64) -> Self {
        Self { proposal_sd }
    }
}

impl ScalarSampler for MetropolisSampler {
    fn step<LogLikelihood, R>(&self, current: f64, llik: &LogLikelihood, rng: &mut R) -> ScalarStep
    where
        LogLikelihood: Fn(f64) -> f64,
        R: Rng + ?Sized,
    {
        let cur_llik = llik(current);

        let z: f64 = StandardNormal.sample(rng);
        let proposal = current + self.proposal_sd * z;
        let new_llik = llik(proposal);

        let log_ratio = (new_llik - cur_llik).min(0.0);
        let u: f64 = rng.random();

        // NaN ratios are rejected
        if u.ln() < log_ratio {
            ScalarStep {
                value: proposal,
                llik: new_llik,
                moved: true,
            }
        } else {
            ScalarStep::stay(current, cur_llik)
        }
    }
}
