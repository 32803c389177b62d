//! Collapsed Gibbs sampling for topic models with structured priors.
//!
//! Three variants share one token sweep and differ in how the topic prior
//! of each document is formed:
//!
//! * LDA with a fixed prior `alpha`
//! * covariate models, `alpha_d = exp(C_d Lambda')` with Gaussian priors
//!   on `Lambda`
//! * time-structured models, where every topic has a Beta profile over
//!   normalized document time
//!
//! Word counts can be weighted by their information content
//! (`-log2 p(w)`), which keeps frequent words from dominating topics.
//!
//! # Example
//!
//! ```no_run
//! use lentil::{Corpus, FitOptions, TopicModel};
//! use rand::rngs::SmallRng;
//! use rand::SeedableRng;
//!
//! let mut rng = SmallRng::seed_from_u64(1);
//! let words = vec![vec![0, 1, 2, 1], vec![3, 4, 3]];
//! let corpus = Corpus::with_random_topics(words, 5, 2, &mut rng)?;
//!
//! let mut model = TopicModel::lda(corpus, FitOptions::with_topics(2))?;
//! model.fit(100)?;
//! let result = model.finish();
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Shared aliases and helpers
pub mod common;

/// Fit options with JSON loading and validation
pub mod config;

/// Documents and their topic assignments
pub mod corpus;

/// Information-content word weights
pub mod vocab_weights;

/// Topic-word and document-topic count tables
pub mod sufficient_stats;

/// Log densities and collapsed likelihoods
pub mod likelihood;

/// Token kernels and the Gibbs sweep
pub mod gibbs;

/// Document priors and their samplers
pub mod hyperparam;

/// Log-linear covariate priors
pub mod covariate;

/// Beta time profiles
pub mod time_structured;

/// Fitting driver and exported results
pub mod inference;

pub use config::{
    BetaParamFit, CovariateOptions, FitOptions, LambdaSamplerKind, Priors, SliceOptions,
    TimeOptions,
};
pub use corpus::{Corpus, Document};
pub use covariate::CovariateAlphaModel;
pub use gibbs::{BaseTokenResampler, Token, TokenResampler};
pub use hyperparam::{DocumentPrior, FixedAlpha, HyperparameterSampler, HyperparameterState};
pub use inference::{fit, FitResult, FitTrace, ModelFit, TopicModel};
pub use sufficient_stats::SufficientStats;
pub use time_structured::{DirectTimeResampler, LogTimeResampler, TimeStructuredModel};
pub use vocab_weights::VocabWeights;
