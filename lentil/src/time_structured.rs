//! Topics with Beta time profiles.
//!
//! Every document carries a timestamp `t_d` in `[0, 1]` and every topic a
//! Beta profile `(a_k, b_k)`. Token resampling multiplies the LDA weight
//! of topic `k` by `Beta(t_d | a_k, b_k)`. After each sweep the profiles
//! are refitted and the per-topic concentrations `alpha_k` are slice
//! sampled under Gamma priors.
//!
//! Peaked profiles overflow the direct densities, so there is a log-domain
//! kernel as well. It is used from the start with `use_log`, after any
//! Beta parameter exceeds `peaked_threshold`, and for single tokens whose
//! direct weights break down.

use crate::common::{debug, info, DVec};
use crate::config::{BetaParamFit, SliceOptions, TimeOptions};
use crate::gibbs::{
    sample_categorical, sample_categorical_log, topic_ln_weights, topic_weights, Token,
    TokenResampler,
};
use crate::hyperparam::{DocumentPrior, HyperparameterSampler, HyperparameterState};
use crate::likelihood::{beta_ln_normalizer, beta_ln_pdf, gamma_ln_pdf, ln_gamma};
use crate::sufficient_stats::SufficientStats;
use mcmc_util::{ScalarSampler, SliceSampler};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::cell::Cell;

/// Variances at or below this are treated as zero by moment matching.
const MIN_TIME_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct TimeStructuredModel {
    timestamps: Vec<f64>,
    alpha: DVec,
    beta_params: Vec<[f64; 2]>,
    num_keyword_topics: usize,
    options: TimeOptions,
    slice: SliceSampler,
    log_domain: bool,
}

impl TimeStructuredModel {
    /// * `timestamps` - one normalized time in `[0, 1]` per document
    /// * `num_keyword_topics` - leading topics that use the keyword Gamma prior
    /// * `num_topics` - total number of topics
    pub fn new(
        timestamps: Vec<f64>,
        num_keyword_topics: usize,
        num_topics: usize,
        options: &TimeOptions,
        slice: &SliceOptions,
    ) -> anyhow::Result<Self> {
        if let Some((d, t)) = timestamps
            .iter()
            .enumerate()
            .find(|(_, t)| !(**t >= 0.0 && **t <= 1.0))
        {
            anyhow::bail!("document {}: timestamp {} is outside [0, 1]", d, t);
        }
        if num_keyword_topics > num_topics {
            anyhow::bail!(
                "{} keyword topics but only {} topics",
                num_keyword_topics,
                num_topics
            );
        }

        Ok(TimeStructuredModel {
            timestamps,
            alpha: DVec::from_element(num_topics, options.init_alpha),
            beta_params: vec![[1.0, 1.0]; num_topics],
            num_keyword_topics,
            options: options.clone(),
            slice: slice.positive_sampler(),
            log_domain: options.use_log,
        })
    }

    /// Start from given Beta profiles, e.g. to resume a run.
    pub fn with_beta_params(mut self, beta_params: Vec<[f64; 2]>) -> anyhow::Result<Self> {
        if beta_params.len() != self.num_topics() {
            anyhow::bail!(
                "expected {} Beta profiles, got {}",
                self.num_topics(),
                beta_params.len()
            );
        }
        if let Some(p) = beta_params
            .iter()
            .find(|p| !p.iter().all(|x| x.is_finite() && *x > 0.0))
        {
            anyhow::bail!("Beta parameters must be positive, got {:?}", p);
        }
        self.beta_params = beta_params;
        self.update_domain();
        Ok(self)
    }

    pub fn num_topics(&self) -> usize {
        self.alpha.len()
    }

    pub fn num_docs(&self) -> usize {
        self.timestamps.len()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn alpha(&self) -> &DVec {
        &self.alpha
    }

    pub fn beta_params(&self) -> &[[f64; 2]] {
        &self.beta_params
    }

    pub fn is_log_domain(&self) -> bool {
        self.log_domain
    }

    fn clamped_time(&self, doc: usize) -> f64 {
        let eps = self.options.time_epsilon;
        self.timestamps[doc].clamp(eps, 1.0 - eps)
    }

    /// `ln Beta(t_d | a_k, b_k)` for every topic
    pub fn ln_time_density(&self, doc: usize) -> DVec {
        let t = self.clamped_time(doc);
        DVec::from_iterator(
            self.beta_params.len(),
            self.beta_params.iter().map(|&[a, b]| beta_ln_pdf(t, a, b)),
        )
    }

    fn update_domain(&mut self) {
        if self.log_domain {
            return;
        }
        let threshold = self.options.peaked_threshold;
        if let Some(k) = self
            .beta_params
            .iter()
            .position(|p| p[0] > threshold || p[1] > threshold)
        {
            info!(
                "topic {} time profile {:?} exceeds {}; resampling in log domain from now on",
                k, self.beta_params[k], threshold
            );
            self.log_domain = true;
        }
    }

    /// Method-of-moments fit of each topic's Beta profile to the timestamps
    /// of its tokens.
    ///
    /// A topic keeps its profile when it has fewer than two tokens, when
    /// the timestamps have (numerically) zero variance, or when the variance
    /// is too large for any Beta distribution with that mean.
    /// Returns the number of topics left unchanged.
    pub fn sample_betaparam(&mut self, stats: &SufficientStats) -> usize {
        let mut skipped = 0;

        for k in 0..self.num_topics() {
            let mut n = 0.0;
            let mut sum = 0.0;
            for (d, &t) in self.timestamps.iter().enumerate() {
                let n_dk = stats.doc_topic[(d, k)];
                n += n_dk;
                sum += n_dk * t;
            }

            if n < 2.0 {
                skipped += 1;
                continue;
            }

            let mean = sum / n;
            let ss: f64 = self
                .timestamps
                .iter()
                .enumerate()
                .map(|(d, &t)| stats.doc_topic[(d, k)] * (t - mean).powi(2))
                .sum();
            let var = ss / (n - 1.0);

            if !(var > MIN_TIME_VARIANCE) {
                skipped += 1;
                continue;
            }

            let common = mean * (1.0 - mean) / var - 1.0;
            let a = mean * common;
            let b = (1.0 - mean) * common;

            if a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0 {
                self.beta_params[k] = [a, b];
            } else {
                skipped += 1;
            }
        }

        self.update_domain();
        skipped
    }

    /// Slice sampling of each `(a_k, b_k)` against
    /// `sum_d n_dk ln Beta(t_d | a, b)` and `Gamma(ts_g1, ts_g2)` priors.
    ///
    /// Topics without tokens keep their profile.
    /// Returns the number of parameters that moved.
    pub fn sample_betaparam_slice<R: Rng + ?Sized>(
        &mut self,
        stats: &SufficientStats,
        rng: &mut R,
    ) -> usize {
        let (g1, g2) = (self.options.ts_g1, self.options.ts_g2);
        let mut moves = 0;

        for k in 0..self.num_topics() {
            let mut n = 0.0;
            let mut sum_ln_t = 0.0;
            let mut sum_ln_1mt = 0.0;
            for d in 0..self.num_docs() {
                let n_dk = stats.doc_topic[(d, k)];
                if n_dk > 0.0 {
                    let t = self.clamped_time(d);
                    n += n_dk;
                    sum_ln_t += n_dk * t.ln();
                    sum_ln_1mt += n_dk * (1.0 - t).ln();
                }
            }
            if n == 0.0 {
                continue;
            }

            let [a, b] = self.beta_params[k];
            let step_a = self.slice.step(
                a,
                &|x| {
                    n * beta_ln_normalizer(x, b) + (x - 1.0) * sum_ln_t + gamma_ln_pdf(x, g1, g2)
                },
                rng,
            );
            let a = step_a.value;

            let step_b = self.slice.step(
                b,
                &|x| {
                    n * beta_ln_normalizer(a, x)
                        + (x - 1.0) * sum_ln_1mt
                        + gamma_ln_pdf(x, g1, g2)
                },
                rng,
            );

            self.beta_params[k] = [a, step_b.value];
            moves += step_a.moved as usize + step_b.moved as usize;
        }

        self.update_domain();
        moves
    }

    /// Gamma prior `(shape, rate)` of topic `k`'s concentration
    pub fn alpha_prior(&self, k: usize) -> (f64, f64) {
        if k < self.num_keyword_topics {
            (self.options.keyword_shape, self.options.keyword_rate)
        } else {
            (self.options.ts_g1, self.options.ts_g2)
        }
    }

    /// Log posterior of `alpha_k = value`, other concentrations fixed
    pub fn alpha_ln_posterior(&self, stats: &SufficientStats, k: usize, value: f64) -> f64 {
        let rest = self.alpha.sum() - self.alpha[k];
        let total = rest + value;
        let lg_total = ln_gamma(total);
        let lg_value = ln_gamma(value);

        let (shape, rate) = self.alpha_prior(k);
        let mut llik = gamma_ln_pdf(value, shape, rate);
        for (d, &len) in stats.doc_len.iter().enumerate() {
            if len == 0 {
                continue;
            }
            llik += lg_total - ln_gamma(len as f64 + total) + ln_gamma(stats.doc_topic[(d, k)] + value)
                - lg_value;
        }
        llik
    }

    /// Slice sample each topic's concentration once, in random order.
    /// Returns the number of topics whose concentration moved.
    pub fn sample_alpha<R: Rng + ?Sized>(&mut self, stats: &SufficientStats, rng: &mut R) -> usize {
        let mut topics: Vec<usize> = (0..self.num_topics()).collect();
        topics.shuffle(rng);

        let mut moves = 0;
        for k in topics {
            let step = self.slice.step(
                self.alpha[k],
                &|x| self.alpha_ln_posterior(stats, k, x),
                rng,
            );
            if step.moved {
                self.alpha[k] = step.value;
                moves += 1;
            }
        }
        moves
    }

    /// `sum_d sum_k n_dk ln Beta(t_d | a_k, b_k)`
    pub fn time_ln_likelihood(&self, stats: &SufficientStats) -> f64 {
        (0..self.num_docs())
            .map(|d| {
                let ln_density = self.ln_time_density(d);
                stats.doc_topic.row(d).dot(&ln_density.transpose())
            })
            .sum()
    }
}

impl HyperparameterSampler for TimeStructuredModel {
    fn name(&self) -> &'static str {
        "time_structured"
    }

    fn num_topics(&self) -> usize {
        self.alpha.len()
    }

    fn num_docs(&self) -> Option<usize> {
        Some(self.timestamps.len())
    }

    fn document_prior(&self, doc: usize) -> DocumentPrior {
        DocumentPrior::with_time(self.alpha.clone(), self.ln_time_density(doc))
    }

    fn sample(&mut self, stats: &SufficientStats, rng: &mut dyn RngCore) -> anyhow::Result<()> {
        match self.options.beta_param_fit {
            BetaParamFit::MomentMatch => {
                let skipped = self.sample_betaparam(stats);
                debug!("beta profiles: {} topics unchanged", skipped);
            }
            BetaParamFit::Slice => {
                let moves = self.sample_betaparam_slice(stats, rng);
                debug!("beta profiles: {} parameters moved", moves);
            }
        }
        let moves = self.sample_alpha(stats, rng);
        debug!("alpha: {} / {} topics moved", moves, self.num_topics());
        Ok(())
    }

    fn ln_extra(&self, stats: &SufficientStats) -> f64 {
        let ln_prior: f64 = (0..self.num_topics())
            .map(|k| {
                let (shape, rate) = self.alpha_prior(k);
                gamma_ln_pdf(self.alpha[k], shape, rate)
            })
            .sum();
        self.time_ln_likelihood(stats) + ln_prior
    }

    /// Concentrations followed by `(a_k, b_k)` pairs
    fn snapshot(&self) -> Vec<f64> {
        self.alpha
            .iter()
            .copied()
            .chain(self.beta_params.iter().flatten().copied())
            .collect()
    }

    fn state(&self) -> HyperparameterState {
        HyperparameterState::TimeStructured {
            alpha: self.alpha.iter().copied().collect(),
            beta_params: self.beta_params.clone(),
        }
    }

    fn prefers_log_domain(&self) -> bool {
        self.log_domain
    }

    fn token_resampler(&self, beta: f64) -> Box<dyn TokenResampler> {
        if self.log_domain {
            Box::new(LogTimeResampler::new(beta))
        } else {
            Box::new(DirectTimeResampler::new(beta))
        }
    }
}

fn time_density<'a>(prior: &'a DocumentPrior) -> anyhow::Result<&'a DVec> {
    prior
        .ln_time_density
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("time-weighted resampling needs a document timestamp"))
}

/// LDA weights times `Beta(t_d | a_k, b_k)`
pub fn time_topic_weights(
    stats: &SufficientStats,
    token: &Token,
    prior: &DocumentPrior,
    ln_time: &DVec,
    beta: f64,
) -> Vec<f64> {
    let mut weights = topic_weights(stats, token, prior, beta);
    for (w, lt) in weights.iter_mut().zip(ln_time.iter()) {
        *w *= lt.exp();
    }
    weights
}

/// Same as `time_topic_weights` on the log scale.
pub fn time_topic_ln_weights(
    stats: &SufficientStats,
    token: &Token,
    prior: &DocumentPrior,
    ln_time: &DVec,
    beta: f64,
) -> Vec<f64> {
    let mut ln_weights = topic_ln_weights(stats, token, prior, beta);
    for (w, lt) in ln_weights.iter_mut().zip(ln_time.iter()) {
        *w += lt;
    }
    ln_weights
}

/// Time-weighted kernel on the probability scale.
///
/// Tokens whose direct weights overflow or vanish are redrawn in the log
/// domain and counted.
#[derive(Debug)]
pub struct DirectTimeResampler {
    beta: f64,
    log_fallbacks: Cell<usize>,
}

impl DirectTimeResampler {
    pub fn new(beta: f64) -> Self {
        DirectTimeResampler {
            beta,
            log_fallbacks: Cell::new(0),
        }
    }
}

impl TokenResampler for DirectTimeResampler {
    fn name(&self) -> &'static str {
        "time_direct"
    }

    fn draw_topic(
        &self,
        stats: &SufficientStats,
        token: &Token,
        prior: &DocumentPrior,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<usize> {
        let ln_time = time_density(prior)?;
        let weights = time_topic_weights(stats, token, prior, ln_time, self.beta);

        let total: f64 = weights.iter().sum();
        if weights.iter().all(|w| w.is_finite()) && total.is_finite() && total > 0.0 {
            return sample_categorical(&weights, rng);
        }

        self.log_fallbacks.set(self.log_fallbacks.get() + 1);
        let ln_weights = time_topic_ln_weights(stats, token, prior, ln_time, self.beta);
        sample_categorical_log(&ln_weights, rng)
    }

    fn take_log_fallbacks(&self) -> usize {
        self.log_fallbacks.replace(0)
    }
}

/// Time-weighted kernel on the log scale.
#[derive(Debug, Clone)]
pub struct LogTimeResampler {
    beta: f64,
}

impl LogTimeResampler {
    pub fn new(beta: f64) -> Self {
        LogTimeResampler { beta }
    }
}

impl TokenResampler for LogTimeResampler {
    fn name(&self) -> &'static str {
        "time_log"
    }

    fn draw_topic(
        &self,
        stats: &SufficientStats,
        token: &Token,
        prior: &DocumentPrior,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<usize> {
        let ln_time = time_density(prior)?;
        let ln_weights = time_topic_ln_weights(stats, token, prior, ln_time, self.beta);
        sample_categorical_log(&ln_weights, rng)
    }
}
