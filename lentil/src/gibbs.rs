//! Collapsed Gibbs token resampling.
//!
//! For each token, the token's own contribution is taken out of the count
//! tables, the conditional over all K topics is evaluated,
//!
//! ```text
//! p(z = k | rest) ∝ (beta + n_kw) (n_dk + alpha_k) / (V beta + n_k)
//! ```
//!
//! a new topic is drawn, and the token is added back under it.

use crate::corpus::Corpus;
use crate::hyperparam::{DocumentPrior, HyperparameterSampler};
use crate::sufficient_stats::SufficientStats;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// One token's location and current assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub doc: usize,
    pub word: usize,
    pub topic: usize,
}

/// Draws a new topic for a single token.
pub trait TokenResampler {
    /// Short label for logging
    fn name(&self) -> &'static str;

    /// Draw a topic for `token` from counts that already exclude it.
    fn draw_topic(
        &self,
        stats: &SufficientStats,
        token: &Token,
        prior: &DocumentPrior,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<usize>;

    /// Remove the token, draw a new topic, add the token back under it.
    ///
    /// On error the token is restored under its old topic.
    fn resample(
        &self,
        stats: &mut SufficientStats,
        token: &Token,
        prior: &DocumentPrior,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<usize> {
        stats.remove(token.doc, token.topic, token.word);
        match self.draw_topic(stats, token, prior, rng) {
            Ok(new_topic) => {
                stats.add(token.doc, new_topic, token.word);
                Ok(new_topic)
            }
            Err(e) => {
                stats.add(token.doc, token.topic, token.word);
                Err(e)
            }
        }
    }

    /// Number of tokens that had to be recomputed in the log domain since
    /// the last call
    fn take_log_fallbacks(&self) -> usize {
        0
    }
}

/// Plain LDA conditional.
#[derive(Debug, Clone)]
pub struct BaseTokenResampler {
    beta: f64,
}

impl BaseTokenResampler {
    pub fn new(beta: f64) -> Self {
        BaseTokenResampler { beta }
    }
}

impl TokenResampler for BaseTokenResampler {
    fn name(&self) -> &'static str {
        "base"
    }

    fn draw_topic(
        &self,
        stats: &SufficientStats,
        token: &Token,
        prior: &DocumentPrior,
        rng: &mut dyn RngCore,
    ) -> anyhow::Result<usize> {
        let weights = topic_weights(stats, token, prior, self.beta);
        sample_categorical(&weights, rng)
    }
}

/// Unnormalized LDA conditional of every topic for `token`.
///
/// * `stats` - counts excluding `token`
/// * `prior` - topic prior of the token's document
/// * `beta` - topic-word smoothing
pub fn topic_weights(
    stats: &SufficientStats,
    token: &Token,
    prior: &DocumentPrior,
    beta: f64,
) -> Vec<f64> {
    let vbeta = stats.num_vocab as f64 * beta;
    (0..stats.num_topics)
        .map(|k| {
            let numerator = (beta + stats.topic_word[(k, token.word)])
                * (stats.doc_topic[(token.doc, k)] + prior.alpha[k]);
            let denominator = vbeta + stats.topic_total[k];
            numerator / denominator
        })
        .collect()
}

/// Same as `topic_weights` on the log scale.
pub fn topic_ln_weights(
    stats: &SufficientStats,
    token: &Token,
    prior: &DocumentPrior,
    beta: f64,
) -> Vec<f64> {
    let vbeta = stats.num_vocab as f64 * beta;
    (0..stats.num_topics)
        .map(|k| {
            (beta + stats.topic_word[(k, token.word)]).ln()
                + (stats.doc_topic[(token.doc, k)] + prior.alpha[k]).ln()
                - (vbeta + stats.topic_total[k]).ln()
        })
        .collect()
}

/// Sample an index with probability proportional to `weights`.
///
/// A weight vector with negative or non-finite entries, or with a
/// non-positive sum, means the count tables are broken; this is an error.
pub fn sample_categorical<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> anyhow::Result<usize> {
    if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
        anyhow::bail!("invalid categorical weights: {:?}", weights);
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        anyhow::bail!("categorical weights sum to {}", total);
    }

    let u: f64 = rng.random::<f64>() * total;
    let mut cum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cum += w;
        if u < cum {
            return Ok(i);
        }
    }

    // rounding: fall back to the last index with positive mass
    Ok(weights
        .iter()
        .rposition(|&w| w > 0.0)
        .unwrap_or(weights.len() - 1))
}

/// Sample an index given unnormalized log-probabilities.
///
/// Uses the log-sum-exp trick for numerical stability.
pub fn sample_categorical_log<R: Rng + ?Sized>(
    log_probs: &[f64],
    rng: &mut R,
) -> anyhow::Result<usize> {
    let max = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        anyhow::bail!("invalid categorical log-weights: {:?}", log_probs);
    }
    let weights: Vec<f64> = log_probs.iter().map(|lp| (lp - max).exp()).collect();
    sample_categorical(&weights, rng)
}

/// Run one full sweep over all tokens.
///
/// Documents are visited in random order, and so are the tokens inside each
/// document. Every token sees the most recent state, including moves of
/// earlier tokens in the same sweep (standard sequential Gibbs).
///
/// Returns the number of tokens whose topic changed.
pub fn sweep_corpus(
    corpus: &mut Corpus,
    stats: &mut SufficientStats,
    resampler: &dyn TokenResampler,
    hyper: &dyn HyperparameterSampler,
    rng: &mut SmallRng,
) -> anyhow::Result<usize> {
    let mut doc_order: Vec<usize> = (0..corpus.num_docs()).collect();
    doc_order.shuffle(rng);

    let mut moves = 0;

    for d in doc_order {
        let doc = &mut corpus.docs[d];
        if doc.is_empty() {
            continue;
        }
        let prior = hyper.document_prior(d);

        let mut positions: Vec<usize> = (0..doc.len()).collect();
        positions.shuffle(rng);

        for pos in positions {
            let token = Token {
                doc: d,
                word: doc.words[pos],
                topic: doc.topics[pos],
            };
            let new_topic = resampler.resample(stats, &token, &prior, rng)?;
            if new_topic != token.topic {
                doc.topics[pos] = new_topic;
                moves += 1;
            }
        }
    }

    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::hyperparam::FixedAlpha;
    use crate::vocab_weights::VocabWeights;
    use rand::SeedableRng;

    fn planted_corpus(seed: u64) -> Corpus {
        // topic 0 uses words 0..5, topic 1 uses words 5..10
        let mut rng = SmallRng::seed_from_u64(seed);
        let words: Vec<Vec<usize>> = (0..20)
            .map(|d| {
                let offset = if d % 2 == 0 { 0 } else { 5 };
                (0..30).map(|_| offset + rng.random_range(0..5)).collect()
            })
            .collect();
        Corpus::with_random_topics(words, 10, 2, &mut rng).unwrap()
    }

    #[test]
    fn test_topic_weights_exclude_current_token() {
        let corpus = Corpus::new(
            vec![
                Document::new(vec![0, 0, 1], vec![0, 0, 1]),
                Document::new(vec![2, 2, 1], vec![1, 1, 0]),
            ],
            3,
        );
        let mut stats = SufficientStats::from_corpus(&corpus, VocabWeights::uniform(3), 2);
        let token = Token {
            doc: 0,
            word: 1,
            topic: 1,
        };
        let prior = DocumentPrior::new(crate::common::DVec::from_vec(vec![1.0, 1.0]));

        stats.remove(token.doc, token.topic, token.word);
        let weights = topic_weights(&stats, &token, &prior, 0.1);

        // (0.1 + 1)(2 + 1)/(0.3 + 3) and (0.1 + 0)(0 + 1)/(0.3 + 2)
        assert!((weights[0] - 1.0).abs() < 1e-12);
        assert!((weights[1] - 0.1 / 2.3).abs() < 1e-12);

        let ln_weights = topic_ln_weights(&stats, &token, &prior, 0.1);
        for (w, lw) in weights.iter().zip(ln_weights.iter()) {
            assert!((w.ln() - lw).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sample_categorical_frequencies() {
        let mut rng = SmallRng::seed_from_u64(42);
        let weights = [1.0, 0.0, 3.0];
        let mut counts = [0usize; 3];
        for _ in 0..20_000 {
            counts[sample_categorical(&weights, &mut rng).unwrap()] += 1;
        }
        assert_eq!(counts[1], 0);
        let frac = counts[2] as f64 / 20_000.0;
        assert!((frac - 0.75).abs() < 0.02, "frac = {}", frac);
    }

    #[test]
    fn test_sample_categorical_rejects_degenerate_weights() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(sample_categorical(&[0.0, 0.0], &mut rng).is_err());
        assert!(sample_categorical(&[1.0, f64::NAN], &mut rng).is_err());
        assert!(sample_categorical(&[1.0, -0.5], &mut rng).is_err());
        assert!(sample_categorical(&[f64::INFINITY, 1.0], &mut rng).is_err());
        assert!(sample_categorical_log(&[f64::NEG_INFINITY; 2], &mut rng).is_err());
    }

    #[test]
    fn test_sample_categorical_log() {
        let mut rng = SmallRng::seed_from_u64(42);

        // strongly peaked: index 1 every time
        let log_probs = vec![-800.0, -100.0, -900.0];
        let mut counts = [0usize; 3];
        for _ in 0..1000 {
            counts[sample_categorical_log(&log_probs, &mut rng).unwrap()] += 1;
        }
        assert_eq!(counts[1], 1000, "Expected only index 1, got {:?}", counts);
    }

    /// Repeatedly resampling one token draws i.i.d. from its conditional.
    #[test]
    fn test_single_token_conditional_chi_squared() {
        let corpus = planted_corpus(1);
        let weights = VocabWeights::from_corpus(&corpus, true);
        let mut stats = SufficientStats::from_corpus(&corpus, weights, 2);
        let prior = DocumentPrior::new(crate::common::DVec::from_vec(vec![0.5, 0.5]));
        let beta = 0.1;
        let resampler = BaseTokenResampler::new(beta);

        let doc = &corpus.docs[3];
        let mut token = Token {
            doc: 3,
            word: doc.words[0],
            topic: doc.topics[0],
        };

        // expected probabilities from counts without the token
        let expected = {
            let mut excluded = stats.clone();
            excluded.remove(token.doc, token.topic, token.word);
            let w = topic_weights(&excluded, &token, &prior, beta);
            let total: f64 = w.iter().sum();
            w.iter().map(|x| x / total).collect::<Vec<_>>()
        };

        let n_draws = 20_000;
        let mut counts = [0usize; 2];
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..n_draws {
            let new_topic = resampler.resample(&mut stats, &token, &prior, &mut rng).unwrap();
            token.topic = new_topic;
            counts[new_topic] += 1;
        }

        let chi_sq: f64 = counts
            .iter()
            .zip(expected.iter())
            .map(|(&o, &p)| {
                let e = p * n_draws as f64;
                (o as f64 - e).powi(2) / e
            })
            .sum();

        // df = 1, p = 0.001
        assert!(chi_sq < 10.83, "chi^2 = {}, counts = {:?}, expected = {:?}", chi_sq, counts, expected);
    }

    #[test]
    fn test_sweep_keeps_tables_consistent() {
        let mut corpus = planted_corpus(2);
        let weights = VocabWeights::from_corpus(&corpus, true);
        let mut stats = SufficientStats::from_corpus(&corpus, weights, 2);
        let hyper = FixedAlpha::symmetric(2, 0.5).unwrap();
        let resampler = BaseTokenResampler::new(0.1);
        let mut rng = SmallRng::seed_from_u64(3);

        for _ in 0..10 {
            sweep_corpus(&mut corpus, &mut stats, &resampler, &hyper, &mut rng).unwrap();
            stats.check_consistency(&corpus, 1e-8).unwrap();
            for d in 0..corpus.num_docs() {
                let row_sum: f64 = stats.doc_topic.row(d).sum();
                assert_eq!(row_sum, corpus.docs[d].len() as f64);
            }
        }
    }

    #[test]
    fn test_sweep_separates_planted_topics() {
        let mut corpus = planted_corpus(5);
        let mut stats = SufficientStats::from_corpus(&corpus, VocabWeights::uniform(10), 2);
        let hyper = FixedAlpha::symmetric(2, 0.1).unwrap();
        let resampler = BaseTokenResampler::new(0.01);
        let mut rng = SmallRng::seed_from_u64(11);

        let first_moves =
            sweep_corpus(&mut corpus, &mut stats, &resampler, &hyper, &mut rng).unwrap();
        for _ in 0..50 {
            sweep_corpus(&mut corpus, &mut stats, &resampler, &hyper, &mut rng).unwrap();
        }
        let late_moves =
            sweep_corpus(&mut corpus, &mut stats, &resampler, &hyper, &mut rng).unwrap();

        assert!(
            late_moves < first_moves,
            "Expected convergence: early_moves={}, late_moves={}",
            first_moves,
            late_moves
        );

        // each document should be dominated by one topic
        for d in 0..corpus.num_docs() {
            let row = stats.doc_topic.row(d);
            let major = row.max();
            assert!(major >= 0.9 * corpus.docs[d].len() as f64, "document {}: {:?}", d, row);
        }
    }
}
