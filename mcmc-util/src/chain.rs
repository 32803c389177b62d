use crate::traits::ChainParam;

/// Collected MCMC samples with log-likelihoods.
#[derive(Debug, Clone)]
pub struct McmcChain<P: ChainParam> {
    /// sweep index at which each sample was recorded
    pub iterations: Vec<usize>,
    pub samples: Vec<P>,
    pub log_likelihoods: Vec<f64>,
}

impl<P: ChainParam> Default for McmcChain<P> {
    fn default() -> Self {
        Self {
            iterations: vec![],
            samples: vec![],
            log_likelihoods: vec![],
        }
    }
}

impl<P: ChainParam> McmcChain<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, iteration: usize, sample: P, llik: f64) {
        self.iterations.push(iteration);
        self.samples.push(sample);
        self.log_likelihoods.push(llik);
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn last(&self) -> Option<&P> {
        self.samples.last()
    }

    /// Element-wise posterior mean across samples.
    pub fn posterior_mean(&self) -> Vec<f64> {
        let n = self.n_samples();
        if n == 0 {
            return vec![];
        }
        let d = self.samples[0].dim();
        let mut mean = vec![0.0; d];
        for sample in &self.samples {
            for (m, &v) in mean.iter_mut().zip(sample.as_slice().iter()) {
                *m += v;
            }
        }
        let inv_n = 1.0 / n as f64;
        for m in &mut mean {
            *m *= inv_n;
        }
        mean
    }

    /// Element-wise posterior variance across samples.
    pub fn posterior_variance(&self) -> Vec<f64> {
        let n = self.n_samples();
        if n < 2 {
            return vec![];
        }
        let mean = self.posterior_mean();
        let mut var = vec![0.0; mean.len()];
        for sample in &self.samples {
            for ((v, &x), &m) in var.iter_mut().zip(sample.as_slice()).zip(mean.iter()) {
                let diff = x - m;
                *v += diff * diff;
            }
        }
        let inv = 1.0 / (n - 1) as f64;
        for v in &mut var {
            *v *= inv;
        }
        var
    }

    /// Element-wise quantile (0 <= q <= 1) across samples.
    pub fn quantile(&self, q: f64) -> Vec<f64> {
        let n = self.n_samples();
        if n == 0 {
            return vec![];
        }
        let d = self.samples[0].dim();

        let mut vals = vec![Vec::with_capacity(n); d];
        for sample in &self.samples {
            for (i, &x) in sample.as_slice().iter().enumerate() {
                vals[i].push(x);
            }
        }

        let idx = (q * (n - 1) as f64).clamp(0.0, (n - 1) as f64);
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        let frac = idx - lo as f64;

        vals.iter_mut()
            .map(|v| {
                v.sort_unstable_by(|a, b| a.total_cmp(b));
                if lo == hi {
                    v[lo]
                } else {
                    v[lo] * (1.0 - frac) + v[hi] * frac
                }
            })
            .collect()
    }
}
