//! Run configuration.
//!
//! Every option has a default, so a JSON file only needs to mention what
//! it overrides:
//!
//! ```json
//! { "num_regular_topics": 5, "priors": { "beta": 0.1 }, "time": { "use_log": true } }
//! ```

use crate::common::ensure_positive;
use anyhow::Context;
use mcmc_util::{MetropolisSampler, SliceSampler};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the covariate regression coefficients are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LambdaSamplerKind {
    /// Gaussian random-walk Metropolis–Hastings
    #[default]
    Metropolis,
    /// bounded univariate slice sampling
    Slice,
}

/// How the per-topic Beta time profiles are fitted after each sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaParamFit {
    /// method of moments on the timestamps of each topic's tokens
    #[default]
    MomentMatch,
    /// slice sampling under a Gamma(ts_g1, ts_g2) prior
    Slice,
}

/// Fixed priors shared by all model variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    /// Topic-word smoothing. Default: 0.01
    pub beta: f64,
    /// Symmetric topic prior of the base model. Default: 1.0
    pub alpha: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Priors {
            beta: 0.01,
            alpha: 1.0,
        }
    }
}

/// Slice sampler settings for positive hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceOptions {
    /// Lower bound of positive parameters. Default: 1e-9
    pub min_v: f64,
    /// Upper bound of positive parameters. Default: 100
    pub max_v: f64,
    /// Initial bracket width. Default: 1.0
    pub width: f64,
    /// Maximum number of stepping-out expansions. Default: 10
    pub max_step_out: usize,
    /// Maximum number of shrinkage proposals before keeping the current value. Default: 200
    pub max_shrink_time: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        SliceOptions {
            min_v: 1e-9,
            max_v: 100.0,
            width: 1.0,
            max_step_out: 10,
            max_shrink_time: 200,
        }
    }
}

impl SliceOptions {
    /// A sampler on `[min_v, max_v]`
    pub fn positive_sampler(&self) -> SliceSampler {
        self.bounded_sampler(self.min_v, self.max_v)
    }

    pub fn bounded_sampler(&self, lb: f64, ub: f64) -> SliceSampler {
        SliceSampler::new(lb, ub)
            .with_width(self.width)
            .with_max_step_out(self.max_step_out)
            .with_max_shrink_time(self.max_shrink_time)
    }
}

/// Covariate (logistic-normal) topic prior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CovariateOptions {
    /// Prior mean of each regression coefficient. Default: 0.0
    pub mu: f64,
    /// Prior standard deviation of each regression coefficient. Default: 1.0
    pub sigma: f64,
    /// Coefficient update strategy. Default: Metropolis
    pub lambda_sampler: LambdaSamplerKind,
    /// Random-walk step size for Metropolis–Hastings. Default: 0.4
    pub proposal_sd: f64,
    /// Slice sampling keeps coefficients within `[-lambda_bound, lambda_bound]`. Default: 10
    pub lambda_bound: f64,
    /// Standard deviation of the random initial coefficients. Default: 0.3
    pub init_sd: f64,
}

impl Default for CovariateOptions {
    fn default() -> Self {
        CovariateOptions {
            mu: 0.0,
            sigma: 1.0,
            lambda_sampler: LambdaSamplerKind::default(),
            proposal_sd: 0.4,
            lambda_bound: 10.0,
            init_sd: 0.3,
        }
    }
}

impl CovariateOptions {
    pub fn metropolis(&self) -> MetropolisSampler {
        MetropolisSampler::new(self.proposal_sd)
    }
}

/// Time-structured topic prior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeOptions {
    /// Always resample tokens in the log domain. Default: false
    pub use_log: bool,
    /// Gamma shape for topic concentrations and Beta parameters. Default: 1.5
    pub ts_g1: f64,
    /// Gamma rate for topic concentrations and Beta parameters. Default: 2.0
    pub ts_g2: f64,
    /// Gamma shape for keyword-topic concentrations. Default: 1.0
    pub keyword_shape: f64,
    /// Gamma rate for keyword-topic concentrations. Default: 1.0
    pub keyword_rate: f64,
    /// Initial topic concentration. Default: 1.0
    pub init_alpha: f64,
    /// Beta parameter update. Default: MomentMatch
    pub beta_param_fit: BetaParamFit,
    /// Switch to log-domain resampling once a Beta parameter exceeds this. Default: 200
    pub peaked_threshold: f64,
    /// Timestamps are kept within `[eps, 1 - eps]` when evaluating Beta densities. Default: 1e-6
    pub time_epsilon: f64,
}

impl Default for TimeOptions {
    fn default() -> Self {
        TimeOptions {
            use_log: false,
            ts_g1: 1.5,
            ts_g2: 2.0,
            keyword_shape: 1.0,
            keyword_rate: 1.0,
            init_alpha: 1.0,
            beta_param_fit: BetaParamFit::default(),
            peaked_threshold: 200.0,
            time_epsilon: 1e-6,
        }
    }
}

/// Options for topic model inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Random seed. Default: 42
    pub seed: u64,
    /// Number of keyword-seeded topics, indexed first. Default: 0
    pub num_keyword_topics: usize,
    /// Number of free topics. Default: 10
    pub num_regular_topics: usize,
    /// Weight words by information content. Default: true
    pub use_weights: bool,
    /// Keep thinned document-topic proportions. Default: false
    pub store_theta: bool,
    /// Keep every `thinning`-th hyperparameter sample. Default: 1
    pub thinning: usize,
    /// Compute log-likelihood and perplexity every `llk_per` iterations. Default: 10
    pub llk_per: usize,
    /// Show a progress bar over iterations. Default: false
    pub show_progress: bool,
    /// Verify count tables against the assignments after each iteration. Default: false
    pub check_invariants: bool,
    pub priors: Priors,
    pub slice: SliceOptions,
    pub covariate: CovariateOptions,
    pub time: TimeOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            seed: 42,
            num_keyword_topics: 0,
            num_regular_topics: 10,
            use_weights: true,
            store_theta: false,
            thinning: 1,
            llk_per: 10,
            show_progress: false,
            check_invariants: false,
            priors: Priors::default(),
            slice: SliceOptions::default(),
            covariate: CovariateOptions::default(),
            time: TimeOptions::default(),
        }
    }
}

impl FitOptions {
    pub fn with_topics(num_regular_topics: usize) -> Self {
        FitOptions {
            num_regular_topics,
            ..Default::default()
        }
    }

    pub fn num_topics(&self) -> usize {
        self.num_keyword_topics + self.num_regular_topics
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let options: FitOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        Self::from_json_str(&json)
    }

    /// Reject settings that would make sampling ill-defined.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_topics() == 0 {
            anyhow::bail!("need at least one topic");
        }
        if self.thinning == 0 {
            anyhow::bail!("thinning must be at least 1");
        }
        if self.llk_per == 0 {
            anyhow::bail!("llk_per must be at least 1");
        }

        ensure_positive("beta", self.priors.beta)?;
        ensure_positive("alpha", self.priors.alpha)?;

        let slice = &self.slice;
        ensure_positive("slice.min_v", slice.min_v)?;
        ensure_positive("slice.width", slice.width)?;
        if !(slice.max_v.is_finite() && slice.max_v > slice.min_v) {
            anyhow::bail!(
                "slice bounds must satisfy min_v < max_v, got [{}, {}]",
                slice.min_v,
                slice.max_v
            );
        }
        if slice.max_shrink_time == 0 {
            anyhow::bail!("slice.max_shrink_time must be at least 1");
        }

        let cov = &self.covariate;
        if !cov.mu.is_finite() {
            anyhow::bail!("covariate.mu must be finite, got {}", cov.mu);
        }
        ensure_positive("covariate.sigma", cov.sigma)?;
        ensure_positive("covariate.proposal_sd", cov.proposal_sd)?;
        ensure_positive("covariate.lambda_bound", cov.lambda_bound)?;
        if !(cov.init_sd.is_finite() && cov.init_sd >= 0.0) {
            anyhow::bail!("covariate.init_sd must be non-negative, got {}", cov.init_sd);
        }

        let time = &self.time;
        ensure_positive("time.ts_g1", time.ts_g1)?;
        ensure_positive("time.ts_g2", time.ts_g2)?;
        ensure_positive("time.keyword_shape", time.keyword_shape)?;
        ensure_positive("time.keyword_rate", time.keyword_rate)?;
        ensure_positive("time.init_alpha", time.init_alpha)?;
        ensure_positive("time.peaked_threshold", time.peaked_threshold)?;
        if !(time.time_epsilon > 0.0 && time.time_epsilon < 0.5) {
            anyhow::bail!(
                "time.time_epsilon must lie in (0, 0.5), got {}",
                time.time_epsilon
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = FitOptions::default();
        options.validate().unwrap();
        assert_eq!(options.num_topics(), 10);
        assert_eq!(options.slice.max_shrink_time, 200);
        assert_eq!(options.covariate.lambda_sampler, LambdaSamplerKind::Metropolis);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "num_keyword_topics": 2,
            "num_regular_topics": 3,
            "priors": { "beta": 0.1 },
            "covariate": { "lambda_sampler": "slice" },
            "time": { "use_log": true, "beta_param_fit": "slice" }
        }"#;
        let options = FitOptions::from_json_str(json).unwrap();
        assert_eq!(options.num_topics(), 5);
        assert_eq!(options.priors.beta, 0.1);
        assert_eq!(options.priors.alpha, 1.0);
        assert_eq!(options.covariate.lambda_sampler, LambdaSamplerKind::Slice);
        assert!(options.time.use_log);
        assert_eq!(options.time.beta_param_fit, BetaParamFit::Slice);
        assert_eq!(options.time.ts_g1, 1.5);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        let err = FitOptions::from_json_file(&path).unwrap_err();
        assert!(format!("{}", err).contains("options.json"));
        // the io error stays in the chain
        assert!(err.chain().count() >= 2);
    }

    #[test]
    fn test_rejects_bad_priors() {
        let mut options = FitOptions::default();
        options.priors.beta = 0.0;
        assert!(options.validate().is_err());

        let mut options = FitOptions::default();
        options.covariate.sigma = -1.0;
        assert!(options.validate().is_err());

        let mut options = FitOptions::default();
        options.time.ts_g2 = f64::NAN;
        assert!(options.validate().is_err());

        let mut options = FitOptions::default();
        options.num_regular_topics = 0;
        assert!(options.validate().is_err());

        let mut options = FitOptions::default();
        options.slice.max_v = options.slice.min_v;
        assert!(options.validate().is_err());

        assert!(FitOptions::from_json_str(r#"{ "priors": { "beta": -0.5 } }"#).is_err());
    }
}
