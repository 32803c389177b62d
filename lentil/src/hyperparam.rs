//! Topic priors and the samplers that update them between sweeps.

use crate::common::DVec;
use crate::gibbs::{BaseTokenResampler, TokenResampler};
use crate::likelihood::dirichlet_multinomial_ln;
use crate::sufficient_stats::SufficientStats;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Everything a token resampler needs to know about a document's prior.
#[derive(Debug, Clone)]
pub struct DocumentPrior {
    /// Dirichlet concentration over topics
    pub alpha: DVec,
    /// `ln Beta(t_d | a_k, b_k)` per topic, for time-structured models
    pub ln_time_density: Option<DVec>,
}

impl DocumentPrior {
    pub fn new(alpha: DVec) -> Self {
        DocumentPrior {
            alpha,
            ln_time_density: None,
        }
    }

    pub fn with_time(alpha: DVec, ln_time_density: DVec) -> Self {
        DocumentPrior {
            alpha,
            ln_time_density: Some(ln_time_density),
        }
    }
}

/// Fitted hyperparameters, in a form the caller can store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum HyperparameterState {
    Fixed {
        alpha: Vec<f64>,
    },
    Covariate {
        /// topic × covariate coefficients
        lambda: Vec<Vec<f64>>,
        mu: f64,
        sigma: f64,
    },
    TimeStructured {
        alpha: Vec<f64>,
        /// `(a_k, b_k)` of each topic's Beta time profile
        beta_params: Vec<[f64; 2]>,
    },
}

/// Source of document priors, updated once per iteration after the token sweep.
pub trait HyperparameterSampler {
    /// Short label for logging
    fn name(&self) -> &'static str;

    /// Number of topics this prior covers
    fn num_topics(&self) -> usize;

    /// Number of documents the prior is tied to, if any
    fn num_docs(&self) -> Option<usize> {
        None
    }

    /// Prior of document `doc` under the current hyperparameters
    fn document_prior(&self, doc: usize) -> DocumentPrior;

    /// One round of hyperparameter updates given the current counts
    fn sample(&mut self, stats: &SufficientStats, rng: &mut dyn RngCore) -> anyhow::Result<()>;

    /// Log-likelihood terms beyond words and document topics
    /// (hyperparameter log-priors, time likelihood)
    fn ln_extra(&self, _stats: &SufficientStats) -> f64 {
        0.0
    }

    /// Current hyperparameters flattened into one vector
    fn snapshot(&self) -> Vec<f64>;

    fn state(&self) -> HyperparameterState;

    /// Whether token resampling should move to the log domain
    fn prefers_log_domain(&self) -> bool {
        false
    }

    /// Token kernel matching this prior under the current settings
    fn token_resampler(&self, beta: f64) -> Box<dyn TokenResampler> {
        Box::new(BaseTokenResampler::new(beta))
    }

    /// Collapsed document log-likelihood `sum_d ln p(n_d | alpha_d)`
    fn document_ln_likelihood(&self, stats: &SufficientStats) -> f64 {
        (0..stats.num_docs())
            .map(|d| {
                let prior = self.document_prior(d);
                dirichlet_multinomial_ln(stats.doc_topic.row(d).iter(), prior.alpha.iter())
            })
            .sum()
    }
}

/// A fixed topic prior shared by all documents (plain LDA).
#[derive(Debug, Clone)]
pub struct FixedAlpha {
    alpha: DVec,
}

impl FixedAlpha {
    pub fn new(alpha: Vec<f64>) -> anyhow::Result<Self> {
        if alpha.is_empty() {
            anyhow::bail!("empty alpha");
        }
        if let Some(a) = alpha.iter().find(|a| !(a.is_finite() && **a > 0.0)) {
            anyhow::bail!("alpha must be positive and finite, got {}", a);
        }
        Ok(FixedAlpha {
            alpha: DVec::from_vec(alpha),
        })
    }

    pub fn symmetric(num_topics: usize, alpha: f64) -> anyhow::Result<Self> {
        Self::new(vec![alpha; num_topics])
    }

    pub fn alpha(&self) -> &DVec {
        &self.alpha
    }
}

impl HyperparameterSampler for FixedAlpha {
    fn name(&self) -> &'static str {
        "lda"
    }

    fn num_topics(&self) -> usize {
        self.alpha.len()
    }

    fn document_prior(&self, _doc: usize) -> DocumentPrior {
        DocumentPrior::new(self.alpha.clone())
    }

    fn sample(&mut self, _stats: &SufficientStats, _rng: &mut dyn RngCore) -> anyhow::Result<()> {
        Ok(())
    }

    fn snapshot(&self) -> Vec<f64> {
        self.alpha.iter().copied().collect()
    }

    fn state(&self) -> HyperparameterState {
        HyperparameterState::Fixed {
            alpha: self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_alpha_rejects_invalid() {
        assert!(FixedAlpha::new(vec![]).is_err());
        assert!(FixedAlpha::new(vec![1.0, 0.0]).is_err());
        assert!(FixedAlpha::new(vec![1.0, f64::INFINITY]).is_err());
        assert!(FixedAlpha::symmetric(3, 0.5).is_ok());
    }

    #[test]
    fn test_fixed_alpha_prior() {
        let fixed = FixedAlpha::new(vec![0.5, 2.0]).unwrap();
        let prior = fixed.document_prior(7);
        assert_eq!(prior.alpha.as_slice(), &[0.5, 2.0]);
        assert!(prior.ln_time_density.is_none());
        assert_eq!(
            fixed.state(),
            HyperparameterState::Fixed {
                alpha: vec![0.5, 2.0]
            }
        );
    }
}
