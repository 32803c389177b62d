//! Univariate slice sampling (Neal 2003, "Slice sampling", Ann. Stat.)
//! with stepping-out and shrinkage, restricted to a bounded interval.

use crate::traits::{ScalarSampler, ScalarStep};
use rand::Rng;
use rand_distr::{Distribution, Exp1};

/// Bounded univariate slice sampler.
///
/// A slice level is drawn below the current log-likelihood, an initial
/// interval of `width` is placed at random around the current value and
/// stepped out at most `max_step_out` times, then shrunk towards the
/// current value until a proposal lands inside the slice. After
/// `max_shrink_time` failed proposals the current value is kept.
#[derive(Debug, Clone)]
pub struct SliceSampler {
    pub min_v: f64,
    pub max_v: f64,
    pub width: f64,
    pub max_step_out: usize,
    pub max_shrink_time: usize,
}

impl Default for SliceSampler {
    fn default() -> Self {
        Self {
            min_v: 1e-9,
            max_v: 100.0,
            width: 1.0,
            max_step_out: 10,
            max_shrink_time: 200,
        }
    }
}

impl SliceSampler {
    pub fn new(min_v: f64, max_v: f64) -> Self {
        Self {
            min_v,
            max_v,
            ..Default::default()
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    pub fn with_max_shrink_time(mut self, max_shrink_time: usize) -> Self {
        self.max_shrink_time = max_shrink_time;
        self
    }

    pub fn with_max_step_out(mut self, max_step_out: usize) -> Self {
        self.max_step_out = max_step_out;
        self
    }

    /// Initial bracket `[lo, hi]` containing `current`, expanded while both
    /// ends are still inside the slice and clipped to `[min_v, max_v]`.
    fn step_out<LogLikelihood, R>(
        &self,
        current: f64,
        level: f64,
        llik: &LogLikelihood,
        rng: &mut R,
    ) -> (f64, f64)
    where
        LogLikelihood: Fn(f64) -> f64,
        R: Rng + ?Sized,
    {
        let u: f64 = rng.random();
        let mut lo = current - self.width * u;
        let mut hi = lo + self.width;

        let v: f64 = rng.random();
        let mut j = (self.max_step_out as f64 * v).floor() as usize;
        let mut k = self.max_step_out.saturating_sub(1).saturating_sub(j);

        while j > 0 && lo > self.min_v && llik(lo) > level {
            lo -= self.width;
            j -= 1;
        }
        while k > 0 && hi < self.max_v && llik(hi) > level {
            hi += self.width;
            k -= 1;
        }

        (lo.max(self.min_v), hi.min(self.max_v))
    }
}

impl ScalarSampler for SliceSampler {
    fn step<LogLikelihood, R>(&self, current: f64, llik: &LogLikelihood, rng: &mut R) -> ScalarStep
    where
        LogLikelihood: Fn(f64) -> f64,
        R: Rng + ?Sized,
    {
        debug_assert!(self.min_v < self.max_v);

        let cur_llik = llik(current);

        // no slice can be defined under an invalid current state
        if !cur_llik.is_finite() || current < self.min_v || current > self.max_v {
            return ScalarStep::stay(current, cur_llik);
        }

        let e: f64 = Exp1.sample(rng);
        let level = cur_llik - e;

        let (mut lo, mut hi) = self.step_out(current, level, llik, rng);

        for _ in 0..self.max_shrink_time {
            if hi <= lo {
                break;
            }
            let proposal = rng.random_range(lo..hi);
            let new_llik = llik(proposal);

            if new_llik > level {
                return ScalarStep {
                    value: proposal,
                    llik: new_llik,
                    moved: true,
                };
            }

            if proposal < current {
                lo = proposal;
            } else {
                hi = proposal;
            }
        }

        ScalarStep::stay(current, cur_llik)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::McmcChain;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn run_chain(
        sampler: &SliceSampler,
        llik: &impl Fn(f64) -> f64,
        init: f64,
        warmup: usize,
        n_samples: usize,
        seed: u64,
    ) -> McmcChain<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut chain = McmcChain::new();
        let mut x = init;
        for i in 0..(warmup + n_samples) {
            let step = sampler.step(x, llik, &mut rng);
            x = step.value;
            if i >= warmup {
                chain.push(i, x, step.llik);
            }
        }
        chain
    }

    #[test]
    fn test_gaussian_moments() {
        let mu = 2.0;
        let sd = 1.5;
        let llik = move |x: f64| -0.5 * (x - mu) * (x - mu) / (sd * sd);

        let sampler = SliceSampler::new(-50.0, 50.0).with_width(2.0);
        let chain = run_chain(&sampler, &llik, 0.0, 1_000, 20_000, 123);

        let mean = chain.posterior_mean()[0];
        let var = chain.posterior_variance()[0];
        assert!((mean - mu).abs() < 0.1, "mean: {}, expected: {}", mean, mu);
        assert!(
            (var - sd * sd).abs() < 0.2,
            "var: {}, expected: {}",
            var,
            sd * sd
        );
    }

    #[test]
    fn test_gamma_on_positive_support() {
        // Gamma(shape=3, rate=2): mean 1.5, var 0.75
        let llik = |x: f64| 2.0 * x.ln() - 2.0 * x;
        let sampler = SliceSampler::default();
        let chain = run_chain(&sampler, &llik, 1.0, 1_000, 20_000, 7);

        let mean = chain.posterior_mean()[0];
        let var = chain.posterior_variance()[0];
        assert!((mean - 1.5).abs() < 0.08, "mean: {}", mean);
        assert!((var - 0.75).abs() < 0.12, "var: {}", var);
        assert!(chain.samples.iter().all(|&x| x >= sampler.min_v));
    }

    #[test]
    fn test_stays_within_bounds() {
        // flat target: every proposal is accepted, so only the bounds restrict it
        let llik = |_x: f64| 0.0;
        let sampler = SliceSampler::new(0.25, 0.75).with_width(5.0);
        let chain = run_chain(&sampler, &llik, 0.5, 0, 5_000, 11);
        assert!(chain.samples.iter().all(|&x| (0.25..=0.75).contains(&x)));
    }

    #[test]
    fn test_keeps_current_after_max_shrink() {
        // only the current point itself is inside the slice
        let current = 0.3;
        let llik = move |x: f64| if x == current { 0.0 } else { f64::NEG_INFINITY };
        let sampler = SliceSampler::new(0.0, 1.0).with_max_shrink_time(50);
        let mut rng = SmallRng::seed_from_u64(1);

        let step = sampler.step(current, &llik, &mut rng);
        assert!(!step.moved);
        assert_eq!(step.value, current);
        assert_eq!(step.llik, 0.0);
    }

    #[test]
    fn test_invalid_current_state_is_kept() {
        let llik = |x: f64| if x > 1.0 { 0.0 } else { f64::NAN };
        let sampler = SliceSampler::new(0.0, 10.0);
        let mut rng = SmallRng::seed_from_u64(3);
        let step = sampler.step(0.5, &llik, &mut rng);
        assert!(!step.moved);
        assert_eq!(step.value, 0.5);
    }
}
