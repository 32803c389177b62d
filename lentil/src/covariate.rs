//! Covariate-dependent topic priors.
//!
//! Each document's topic prior is a log-linear function of its covariates,
//!
//! ```text
//! alpha_dk = exp( sum_t C_dt Lambda_kt )
//! ```
//!
//! with independent `N(mu, sigma^2)` priors on the coefficients. After each
//! token sweep every coefficient is updated once, in random order, either
//! by random-walk Metropolis–Hastings or by slice sampling.

use crate::common::{debug, mat_rows, DVec, Mat};
use crate::config::{CovariateOptions, LambdaSamplerKind, SliceOptions};
use crate::hyperparam::{DocumentPrior, HyperparameterSampler, HyperparameterState};
use crate::likelihood::{gaussian_ln_pdf, ln_gamma};
use crate::sufficient_stats::SufficientStats;
use mcmc_util::{MetropolisSampler, ScalarSampler, ScalarStep, SliceSampler};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};

/// Coefficient update strategy.
#[derive(Debug, Clone)]
pub enum LambdaKernel {
    Metropolis(MetropolisSampler),
    Slice(SliceSampler),
}

impl LambdaKernel {
    pub fn from_options(options: &CovariateOptions, slice: &SliceOptions) -> Self {
        match options.lambda_sampler {
            LambdaSamplerKind::Metropolis => LambdaKernel::Metropolis(options.metropolis()),
            LambdaSamplerKind::Slice => LambdaKernel::Slice(
                slice.bounded_sampler(-options.lambda_bound, options.lambda_bound),
            ),
        }
    }

    fn step<LogLikelihood, R>(&self, current: f64, llik: &LogLikelihood, rng: &mut R) -> ScalarStep
    where
        LogLikelihood: Fn(f64) -> f64,
        R: Rng + ?Sized,
    {
        match self {
            LambdaKernel::Metropolis(mh) => mh.step(current, llik, rng),
            LambdaKernel::Slice(slice) => slice.step(current, llik, rng),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LambdaKernel::Metropolis(_) => "metropolis",
            LambdaKernel::Slice(_) => "slice",
        }
    }
}

/// Log-linear regression of topic priors on document covariates.
#[derive(Debug, Clone)]
pub struct CovariateAlphaModel {
    /// D×P covariates
    covariates: Mat,
    /// K×P coefficients
    lambda: Mat,
    mu: f64,
    sigma: f64,
    kernel: LambdaKernel,
}

impl CovariateAlphaModel {
    /// Coefficients start at small random values around zero.
    pub fn new<R: Rng + ?Sized>(
        covariates: Mat,
        num_topics: usize,
        options: &CovariateOptions,
        slice: &SliceOptions,
        rng: &mut R,
    ) -> anyhow::Result<Self> {
        if covariates.ncols() == 0 {
            anyhow::bail!("covariate matrix has no columns");
        }
        if let Some(x) = covariates.iter().find(|x| !x.is_finite()) {
            anyhow::bail!("covariates must be finite, found {}", x);
        }

        let init_sd = options.init_sd;
        let lambda = Mat::from_fn(num_topics, covariates.ncols(), |_, _| {
            let z: f64 = StandardNormal.sample(rng);
            init_sd * z
        });

        Ok(CovariateAlphaModel {
            covariates,
            lambda,
            mu: options.mu,
            sigma: options.sigma,
            kernel: LambdaKernel::from_options(options, slice),
        })
    }

    /// Replace the coefficients, e.g. to resume from a stored state.
    pub fn with_lambda(mut self, lambda: Mat) -> anyhow::Result<Self> {
        if lambda.shape() != self.lambda.shape() {
            anyhow::bail!(
                "expected {:?} coefficients, got {:?}",
                self.lambda.shape(),
                lambda.shape()
            );
        }
        if let Some(x) = lambda.iter().find(|x| !x.is_finite()) {
            anyhow::bail!("coefficients must be finite, found {}", x);
        }
        self.lambda = lambda;
        Ok(self)
    }

    pub fn num_docs(&self) -> usize {
        self.covariates.nrows()
    }

    pub fn num_covariates(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn covariates(&self) -> &Mat {
        &self.covariates
    }

    pub fn lambda(&self) -> &Mat {
        &self.lambda
    }

    pub fn kernel(&self) -> &LambdaKernel {
        &self.kernel
    }

    /// D×K linear predictor `C * Lambda'`
    pub fn linear_predictor(&self) -> Mat {
        &self.covariates * self.lambda.transpose()
    }

    /// D×K topic priors of all documents
    pub fn alpha_matrix(&self) -> Mat {
        self.linear_predictor().map(f64::exp)
    }

    pub fn document_alpha(&self, doc: usize) -> DVec {
        (&self.lambda * self.covariates.row(doc).transpose()).map(f64::exp)
    }

    /// Log posterior of `Lambda[k][t] = value` with all other coefficients
    /// and the topic counts held fixed, up to an additive constant.
    pub fn coefficient_ln_posterior(
        &self,
        stats: &SufficientStats,
        k: usize,
        t: usize,
        value: f64,
    ) -> f64 {
        let eta = self.linear_predictor();
        let alpha = eta.map(f64::exp);
        let cond = CoefficientConditional::new(self, stats, &eta, &alpha, k, t);
        cond.ln_posterior(value)
    }

    /// Update every coefficient once, topics and covariates in random order.
    ///
    /// Each update sees the coefficients accepted before it.
    /// Returns the number of coefficients that moved.
    pub fn sample_lambda<R: Rng + ?Sized>(&mut self, stats: &SufficientStats, rng: &mut R) -> usize {
        let num_topics = self.lambda.nrows();
        let num_cov = self.lambda.ncols();

        let mut eta = self.linear_predictor();
        let mut alpha = eta.map(f64::exp);

        let mut topic_ids: Vec<usize> = (0..num_topics).collect();
        let mut cov_ids: Vec<usize> = (0..num_cov).collect();
        topic_ids.shuffle(rng);
        cov_ids.shuffle(rng);

        let mut moves = 0;

        for &k in &topic_ids {
            for &t in &cov_ids {
                let current = self.lambda[(k, t)];
                let step = {
                    let cond = CoefficientConditional::new(self, stats, &eta, &alpha, k, t);
                    self.kernel.step(current, &|x| cond.ln_posterior(x), rng)
                };

                if step.moved {
                    let delta = step.value - current;
                    self.lambda[(k, t)] = step.value;
                    for d in 0..eta.nrows() {
                        eta[(d, k)] += self.covariates[(d, t)] * delta;
                        alpha[(d, k)] = eta[(d, k)].exp();
                    }
                    moves += 1;
                }
            }
        }

        moves
    }

    /// `sum_kt ln N(Lambda_kt | mu, sigma^2)`
    pub fn ln_prior(&self) -> f64 {
        self.lambda
            .iter()
            .map(|&x| gaussian_ln_pdf(x, self.mu, self.sigma))
            .sum()
    }
}

/// Terms of the log posterior that stay fixed while one coefficient varies.
///
/// With `eta_dk = base_d + C_dt x`, `alpha_dk = exp(eta_dk)` and
/// `rest_d = sum_{j != k} alpha_dj`:
///
/// ```text
/// sum_d [ lgamma(rest_d + alpha_dk) - lgamma(len_d + rest_d + alpha_dk)
///         - lgamma(alpha_dk) + lgamma(n_dk + alpha_dk) ] + ln N(x | mu, sigma^2)
/// ```
struct CoefficientConditional<'a> {
    stats: &'a SufficientStats,
    covariates: &'a Mat,
    k: usize,
    t: usize,
    base: Vec<f64>,
    rest: Vec<f64>,
    mu: f64,
    sigma: f64,
}

impl<'a> CoefficientConditional<'a> {
    fn new(
        model: &'a CovariateAlphaModel,
        stats: &'a SufficientStats,
        eta: &Mat,
        alpha: &Mat,
        k: usize,
        t: usize,
    ) -> Self {
        let current = model.lambda[(k, t)];
        let num_docs = eta.nrows();
        let base = (0..num_docs)
            .map(|d| eta[(d, k)] - model.covariates[(d, t)] * current)
            .collect();
        let rest = (0..num_docs)
            .map(|d| alpha.row(d).sum() - alpha[(d, k)])
            .collect();
        CoefficientConditional {
            stats,
            covariates: &model.covariates,
            k,
            t,
            base,
            rest,
            mu: model.mu,
            sigma: model.sigma,
        }
    }

    fn ln_posterior(&self, x: f64) -> f64 {
        let mut llik = gaussian_ln_pdf(x, self.mu, self.sigma);
        for (d, (&base, &rest)) in self.base.iter().zip(self.rest.iter()).enumerate() {
            let a = (base + self.covariates[(d, self.t)] * x).exp();
            if !(a > 0.0 && a.is_finite()) {
                return f64::NEG_INFINITY;
            }
            let s = rest + a;
            let len = self.stats.doc_len[d] as f64;
            llik += ln_gamma(s) - ln_gamma(len + s) - ln_gamma(a)
                + ln_gamma(self.stats.doc_topic[(d, self.k)] + a);
        }
        llik
    }
}

impl HyperparameterSampler for CovariateAlphaModel {
    fn name(&self) -> &'static str {
        "covariate"
    }

    fn num_topics(&self) -> usize {
        self.lambda.nrows()
    }

    fn num_docs(&self) -> Option<usize> {
        Some(self.covariates.nrows())
    }

    fn document_prior(&self, doc: usize) -> DocumentPrior {
        DocumentPrior::new(self.document_alpha(doc))
    }

    fn sample(&mut self, stats: &SufficientStats, rng: &mut dyn RngCore) -> anyhow::Result<()> {
        let moves = self.sample_lambda(stats, rng);
        debug!(
            "lambda ({}): {} / {} coefficients moved",
            self.kernel.name(),
            moves,
            self.lambda.len()
        );
        Ok(())
    }

    fn ln_extra(&self, _stats: &SufficientStats) -> f64 {
        self.ln_prior()
    }

    /// Row-major coefficients
    fn snapshot(&self) -> Vec<f64> {
        self.lambda.transpose().as_slice().to_vec()
    }

    fn state(&self) -> HyperparameterState {
        HyperparameterState::Covariate {
            lambda: mat_rows(&self.lambda),
            mu: self.mu,
            sigma: self.sigma,
        }
    }
}
