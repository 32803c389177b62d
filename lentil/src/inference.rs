//! Model fitting.
//!
//! A `TopicModel` owns the corpus, the count tables, one token kernel and
//! one hyperparameter sampler. Each iteration is a full token sweep
//! followed by one round of hyperparameter updates:
//!
//! ```text
//! Initialized -> { TokenSweep -> ParameterUpdate } x iterations -> Finalized
//! ```
//!
//! Count tables are consistent at every iteration boundary, so a model can
//! be fitted in several calls and inspected in between.

use crate::common::{debug, info, mat_rows, new_progress_bar, warn, Mat, ProgressBar};
use crate::config::FitOptions;
use crate::corpus::Corpus;
use crate::covariate::CovariateAlphaModel;
use crate::gibbs::{sweep_corpus, Token, TokenResampler};
use crate::hyperparam::{FixedAlpha, HyperparameterSampler, HyperparameterState};
use crate::likelihood::word_ln_likelihood;
use crate::sufficient_stats::SufficientStats;
use crate::time_structured::TimeStructuredModel;
use crate::vocab_weights::VocabWeights;
use anyhow::Context;
use mcmc_util::McmcChain;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Tolerance of the per-iteration table check
const INVARIANT_TOL: f64 = 1e-6;

/// Log-likelihood and perplexity at one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    pub iteration: usize,
    pub log_likelihood: f64,
    pub perplexity: f64,
}

/// A condition worth reporting that does not stop the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub iteration: usize,
    pub message: String,
}

/// Per-iteration record of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitTrace {
    pub model_fit: Vec<ModelFit>,
    /// Tokens that changed topic, per iteration
    pub moves: Vec<usize>,
    /// Tokens redrawn in the log domain after the direct weights failed
    pub log_fallbacks: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Hyperparameters stored at one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperSample {
    pub iteration: usize,
    pub log_likelihood: f64,
    pub values: Vec<f64>,
}

/// Document-topic proportions stored at one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThetaSample {
    pub iteration: usize,
    pub theta: Vec<Vec<f64>>,
}

/// Everything a caller needs after fitting: final assignments, count
/// tables, fitted hyperparameters and the thinned samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub model: String,
    pub iterations: usize,
    pub num_topics: usize,
    pub num_keyword_topics: usize,
    pub num_vocab: usize,
    pub topics: Vec<Vec<usize>>,
    /// K×V weighted counts
    pub topic_word: Vec<Vec<f64>>,
    /// D×K counts
    pub doc_topic: Vec<Vec<f64>>,
    pub vocab_weights: Vec<f64>,
    pub hyperparameters: HyperparameterState,
    pub hyper_samples: Vec<HyperSample>,
    pub theta_samples: Vec<ThetaSample>,
    pub trace: FitTrace,
}

pub struct TopicModel {
    corpus: Corpus,
    stats: SufficientStats,
    resampler: Box<dyn TokenResampler>,
    hyper: Box<dyn HyperparameterSampler>,
    options: FitOptions,
    rng: SmallRng,
    iteration: usize,
    log_domain: bool,
    trace: FitTrace,
    hyper_chain: McmcChain<Vec<f64>>,
    theta_chain: McmcChain<Mat>,
}

impl TopicModel {
    /// Plain LDA with a symmetric prior `options.priors.alpha`.
    pub fn lda(corpus: Corpus, options: FitOptions) -> anyhow::Result<Self> {
        check_inputs(&corpus, &options)?;
        let hyper = FixedAlpha::symmetric(options.num_topics(), options.priors.alpha)?;
        Self::with_sampler(corpus, Box::new(hyper), options)
    }

    /// Plain LDA with an explicit topic prior.
    pub fn lda_with_alpha(
        corpus: Corpus,
        alpha: Vec<f64>,
        options: FitOptions,
    ) -> anyhow::Result<Self> {
        check_inputs(&corpus, &options)?;
        if alpha.len() != options.num_topics() {
            anyhow::bail!(
                "alpha has {} entries for {} topics",
                alpha.len(),
                options.num_topics()
            );
        }
        let hyper = FixedAlpha::new(alpha)?;
        Self::with_sampler(corpus, Box::new(hyper), options)
    }

    /// Topic priors regressed on a D×P covariate matrix.
    pub fn covariate(corpus: Corpus, covariates: Mat, options: FitOptions) -> anyhow::Result<Self> {
        check_inputs(&corpus, &options)?;
        if covariates.nrows() != corpus.num_docs() {
            anyhow::bail!(
                "covariate matrix has {} rows for {} documents",
                covariates.nrows(),
                corpus.num_docs()
            );
        }
        let mut rng = SmallRng::seed_from_u64(options.seed);
        let hyper = CovariateAlphaModel::new(
            covariates,
            options.num_topics(),
            &options.covariate,
            &options.slice,
            &mut rng,
        )?;
        Self::build(corpus, Box::new(hyper), options, rng)
    }

    /// Topics with Beta time profiles over one timestamp per document.
    pub fn time_structured(
        corpus: Corpus,
        timestamps: Vec<f64>,
        options: FitOptions,
    ) -> anyhow::Result<Self> {
        check_inputs(&corpus, &options)?;
        if timestamps.len() != corpus.num_docs() {
            anyhow::bail!(
                "{} timestamps for {} documents",
                timestamps.len(),
                corpus.num_docs()
            );
        }
        let hyper = TimeStructuredModel::new(
            timestamps,
            options.num_keyword_topics,
            options.num_topics(),
            &options.time,
            &options.slice,
        )?;
        Self::with_sampler(corpus, Box::new(hyper), options)
    }

    /// Any hyperparameter sampler; its token kernel is used for the sweeps.
    pub fn with_sampler(
        corpus: Corpus,
        hyper: Box<dyn HyperparameterSampler>,
        options: FitOptions,
    ) -> anyhow::Result<Self> {
        let rng = SmallRng::seed_from_u64(options.seed);
        Self::build(corpus, hyper, options, rng)
    }

    fn build(
        corpus: Corpus,
        hyper: Box<dyn HyperparameterSampler>,
        options: FitOptions,
        rng: SmallRng,
    ) -> anyhow::Result<Self> {
        check_inputs(&corpus, &options)?;
        let num_topics = options.num_topics();

        if hyper.num_topics() != num_topics {
            anyhow::bail!(
                "{} prior covers {} topics, options ask for {}",
                hyper.name(),
                hyper.num_topics(),
                num_topics
            );
        }
        if let Some(n) = hyper.num_docs() {
            if n != corpus.num_docs() {
                anyhow::bail!(
                    "{} prior is tied to {} documents, corpus has {}",
                    hyper.name(),
                    n,
                    corpus.num_docs()
                );
            }
        }

        let mut trace = FitTrace::default();
        if !options.use_weights {
            let message = "vocabulary weighting is disabled; every word counts as 1".to_string();
            warn!("{}", message);
            trace.diagnostics.push(Diagnostic {
                iteration: 0,
                message,
            });
        }

        let weights = VocabWeights::from_corpus(&corpus, options.use_weights);
        let stats = SufficientStats::from_corpus(&corpus, weights, num_topics);

        let resampler = hyper.token_resampler(options.priors.beta);
        let log_domain = hyper.prefers_log_domain();

        info!(
            "{} model: {} documents, {} tokens, {} words, {} topics ({} keyword), {} kernel",
            hyper.name(),
            corpus.num_docs(),
            corpus.total_tokens(),
            corpus.num_vocab,
            num_topics,
            options.num_keyword_topics,
            resampler.name()
        );

        Ok(TopicModel {
            corpus,
            stats,
            resampler,
            hyper,
            options,
            rng,
            iteration: 0,
            log_domain,
            trace,
            hyper_chain: McmcChain::new(),
            theta_chain: McmcChain::new(),
        })
    }

    /// Run `iterations` more iterations.
    pub fn fit(&mut self, iterations: usize) -> anyhow::Result<()> {
        let pb = if self.options.show_progress {
            new_progress_bar(
                iterations as u64,
                "Gibbs {bar:40} {pos}/{len} iterations ({eta})",
            )
        } else {
            ProgressBar::hidden()
        };

        let last = self.iteration + iterations;
        for _ in 0..iterations {
            self.iteration_single(last)?;
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(())
    }

    fn iteration_single(&mut self, last: usize) -> anyhow::Result<()> {
        self.iteration += 1;
        let it = self.iteration;

        let moves = sweep_corpus(
            &mut self.corpus,
            &mut self.stats,
            self.resampler.as_ref(),
            self.hyper.as_ref(),
            &mut self.rng,
        )
        .with_context(|| format!("token sweep failed at iteration {}", it))?;
        self.trace.moves.push(moves);

        let fallbacks = self.resampler.take_log_fallbacks();
        if fallbacks > 0 {
            debug!("iteration {}: {} tokens redrawn in log domain", it, fallbacks);
            self.trace.log_fallbacks += fallbacks;
        }

        self.hyper
            .sample(&self.stats, &mut self.rng)
            .with_context(|| format!("{} update failed at iteration {}", self.hyper.name(), it))?;

        if !self.log_domain && self.hyper.prefers_log_domain() {
            self.resampler = self.hyper.token_resampler(self.options.priors.beta);
            self.log_domain = true;
            info!("iteration {}: switched to {} kernel", it, self.resampler.name());
        }

        if self.options.check_invariants {
            self.stats
                .check_consistency(&self.corpus, INVARIANT_TOL)
                .with_context(|| format!("after iteration {}", it))?;
        }

        if it % self.options.llk_per == 0 || it == last {
            let log_likelihood = self.log_likelihood();
            let perplexity = self.perplexity(log_likelihood);
            info!(
                "[{}] log-likelihood {:.3} perplexity {:.3} ({} moves)",
                it, log_likelihood, perplexity, moves
            );
            self.trace.model_fit.push(ModelFit {
                iteration: it,
                log_likelihood,
                perplexity,
            });
        }

        if it % self.options.thinning == 0 {
            let llik = self.log_likelihood();
            self.hyper_chain.push(it, self.hyper.snapshot(), llik);
            if self.options.store_theta {
                self.theta_chain.push(it, self.theta(), llik);
            }
        }

        Ok(())
    }

    /// Resample the token at `pos` of document `doc` once, outside a sweep.
    pub fn resample_token(
        &mut self,
        doc: usize,
        pos: usize,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<usize> {
        let document = self
            .corpus
            .docs
            .get(doc)
            .ok_or_else(|| anyhow::anyhow!("no document {}", doc))?;
        if pos >= document.len() {
            anyhow::bail!("document {} has no token {}", doc, pos);
        }
        let token = Token {
            doc,
            word: document.words[pos],
            topic: document.topics[pos],
        };
        let prior = self.hyper.document_prior(doc);
        let new_topic = self.resampler.resample(&mut self.stats, &token, &prior, rng)?;
        self.corpus.docs[doc].topics[pos] = new_topic;
        Ok(new_topic)
    }

    /// Words, document topics and hyperparameter terms
    pub fn log_likelihood(&self) -> f64 {
        word_ln_likelihood(&self.stats, self.options.priors.beta)
            + self.hyper.document_ln_likelihood(&self.stats)
            + self.hyper.ln_extra(&self.stats)
    }

    /// `exp(-llik / N)` over all `N` tokens
    pub fn perplexity(&self, log_likelihood: f64) -> f64 {
        let n = self.stats.total_tokens().max(1) as f64;
        (-log_likelihood / n).exp()
    }

    /// D×K posterior mean `(n_dk + alpha_dk) / (len_d + sum_k alpha_dk)`
    pub fn theta(&self) -> Mat {
        let mut theta = Mat::zeros(self.stats.num_docs(), self.stats.num_topics);
        for d in 0..self.stats.num_docs() {
            let alpha = self.hyper.document_prior(d).alpha;
            let denom = self.stats.doc_len[d] as f64 + alpha.sum();
            for k in 0..self.stats.num_topics {
                theta[(d, k)] = (self.stats.doc_topic[(d, k)] + alpha[k]) / denom;
            }
        }
        theta
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn stats(&self) -> &SufficientStats {
        &self.stats
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn trace(&self) -> &FitTrace {
        &self.trace
    }

    pub fn kernel_name(&self) -> &'static str {
        self.resampler.name()
    }

    pub fn is_log_domain(&self) -> bool {
        self.log_domain
    }

    pub fn hyperparameters(&self) -> HyperparameterState {
        self.hyper.state()
    }

    pub fn hyper_samples(&self) -> &McmcChain<Vec<f64>> {
        &self.hyper_chain
    }

    pub fn theta_samples(&self) -> &McmcChain<Mat> {
        &self.theta_chain
    }

    pub fn finish(self) -> FitResult {
        let hyper_samples = self
            .hyper_chain
            .iterations
            .iter()
            .zip(self.hyper_chain.samples.iter())
            .zip(self.hyper_chain.log_likelihoods.iter())
            .map(|((&iteration, values), &log_likelihood)| HyperSample {
                iteration,
                log_likelihood,
                values: values.clone(),
            })
            .collect();

        let theta_samples = self
            .theta_chain
            .iterations
            .iter()
            .zip(self.theta_chain.samples.iter())
            .map(|(&iteration, theta)| ThetaSample {
                iteration,
                theta: mat_rows(theta),
            })
            .collect();

        FitResult {
            model: self.hyper.name().to_string(),
            iterations: self.iteration,
            num_topics: self.stats.num_topics,
            num_keyword_topics: self.options.num_keyword_topics,
            num_vocab: self.stats.num_vocab,
            topics: self.corpus.topic_sequences(),
            topic_word: mat_rows(&self.stats.topic_word),
            doc_topic: mat_rows(&self.stats.doc_topic),
            vocab_weights: self.stats.vocab_weights().as_vector().iter().copied().collect(),
            hyperparameters: self.hyper.state(),
            hyper_samples,
            theta_samples,
            trace: self.trace,
        }
    }
}

fn check_inputs(corpus: &Corpus, options: &FitOptions) -> anyhow::Result<()> {
    options.validate()?;
    corpus.validate(options.num_topics())?;
    Ok(())
}

/// Run `iterations` iterations on `model` and hand it back.
pub fn fit(mut model: TopicModel, iterations: usize) -> anyhow::Result<TopicModel> {
    model.fit(iterations)?;
    Ok(model)
}
