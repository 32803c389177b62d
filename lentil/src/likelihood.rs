//! Log densities and collapsed log-likelihoods.
//!
//! # Dirichlet–multinomial (one document)
//!
//! ```text
//! ln p(n_d | alpha) = lgamma(sum_k alpha_k) - lgamma(len_d + sum_k alpha_k)
//!                     + sum_k [ lgamma(n_dk + alpha_k) - lgamma(alpha_k) ]
//! ```

use crate::sufficient_stats::SufficientStats;
use special::Gamma as SpecialGamma;
use std::f64::consts::PI;

#[inline]
pub fn ln_gamma(x: f64) -> f64 {
    SpecialGamma::ln_gamma(x).0
}

/// `ln N(x | mu, sigma^2)`
#[inline]
pub fn gaussian_ln_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -0.5 * (2.0 * PI * sigma * sigma).ln() - 0.5 * z * z
}

/// `ln Gamma(x | shape, rate)`
#[inline]
pub fn gamma_ln_pdf(x: f64, shape: f64, rate: f64) -> f64 {
    if x <= 0.0 {
        return f64::NEG_INFINITY;
    }
    shape * rate.ln() - ln_gamma(shape) + (shape - 1.0) * x.ln() - rate * x
}

/// `ln [Gamma(a + b) / (Gamma(a) Gamma(b))]`
#[inline]
pub fn beta_ln_normalizer(a: f64, b: f64) -> f64 {
    ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b)
}

/// `ln Beta(t | a, b)` for `t` strictly inside `(0, 1)`
#[inline]
pub fn beta_ln_pdf(t: f64, a: f64, b: f64) -> f64 {
    beta_ln_normalizer(a, b) + (a - 1.0) * t.ln() + (b - 1.0) * (1.0 - t).ln()
}

/// Dirichlet–multinomial log-likelihood of one document's topic counts.
///
/// * `counts` - topic counts `n_dk` of the document
/// * `alpha` - topic prior of the document
pub fn dirichlet_multinomial_ln<'a, C, A>(counts: C, alpha: A) -> f64
where
    C: IntoIterator<Item = &'a f64>,
    A: IntoIterator<Item = &'a f64>,
{
    let mut len = 0.0;
    let mut alpha_sum = 0.0;
    let mut llik = 0.0;
    for (&n, &a) in counts.into_iter().zip(alpha) {
        len += n;
        alpha_sum += a;
        llik += ln_gamma(n + a) - ln_gamma(a);
    }
    llik + ln_gamma(alpha_sum) - ln_gamma(len + alpha_sum)
}

/// Collapsed log-likelihood of the words given topic assignments.
///
/// Uses unweighted counts: `topic_word[k][v] / weight(v)` and
/// `topic_total_unweighted[k]`. A word only weighs zero when it is the whole
/// vocabulary, so its count is then the topic total.
pub fn word_ln_likelihood(stats: &SufficientStats, beta: f64) -> f64 {
    let vbeta = stats.num_vocab as f64 * beta;
    let lg_beta = ln_gamma(beta);
    let lg_vbeta = ln_gamma(vbeta);

    let mut llik = 0.0;
    for k in 0..stats.num_topics {
        for v in 0..stats.num_vocab {
            let w = stats.weight(v);
            let n_kv = if w > 0.0 {
                stats.topic_word[(k, v)] / w
            } else {
                stats.topic_total_unweighted[k]
            };
            llik += ln_gamma(beta + n_kv) - lg_beta;
        }
        llik += lg_vbeta - ln_gamma(vbeta + stats.topic_total_unweighted[k]);
    }
    llik
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Corpus, Document};
    use crate::vocab_weights::VocabWeights;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ln_gamma_values() {
        assert_abs_diff_eq!(ln_gamma(1.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ln_gamma(5.0), 24.0f64.ln(), epsilon = 1e-10);
        assert_abs_diff_eq!(ln_gamma(0.5), PI.sqrt().ln(), epsilon = 1e-10);
    }

    #[test]
    fn test_gaussian_ln_pdf() {
        let expected = -0.5 * (2.0 * PI).ln();
        assert_abs_diff_eq!(gaussian_ln_pdf(0.0, 0.0, 1.0), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(
            gaussian_ln_pdf(3.0, 1.0, 2.0),
            -0.5 * (8.0 * PI).ln() - 0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gamma_ln_pdf() {
        // Gamma(1, rate) is Exponential(rate)
        assert_abs_diff_eq!(gamma_ln_pdf(0.7, 1.0, 2.0), 2.0f64.ln() - 1.4, epsilon = 1e-12);
        assert_eq!(gamma_ln_pdf(0.0, 2.0, 1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_beta_ln_pdf() {
        // Beta(1, 1) is uniform
        assert_abs_diff_eq!(beta_ln_pdf(0.3, 1.0, 1.0), 0.0, epsilon = 1e-12);
        // Beta(2, 3): 12 t (1 - t)^2
        let t: f64 = 0.4;
        assert_abs_diff_eq!(
            beta_ln_pdf(t, 2.0, 3.0),
            (12.0 * t * (1.0 - t).powi(2)).ln(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_dirichlet_multinomial_single_token() {
        // one token in topic 0 under alpha = [1, 3]: probability 1/4
        let counts = [1.0, 0.0];
        let alpha = [1.0, 3.0];
        let llik = dirichlet_multinomial_ln(&counts, &alpha);
        assert_abs_diff_eq!(llik, 0.25f64.ln(), epsilon = 1e-10);

        // an empty document contributes nothing
        assert_abs_diff_eq!(dirichlet_multinomial_ln(&[0.0, 0.0], &alpha), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_word_llk_single_word_vocabulary() {
        // weight of the only word is -log2(1) = 0
        let corpus = Corpus::new(vec![Document::new(vec![0, 0, 0], vec![0, 1, 0])], 1);
        let weights = VocabWeights::from_corpus(&corpus, true);
        assert_eq!(weights.get(0), 0.0);

        let stats = SufficientStats::from_corpus(&corpus, weights, 2);
        let llk = word_ln_likelihood(&stats, 0.1);
        // every topic emits the only word with probability one
        assert_abs_diff_eq!(llk, 0.0, epsilon = 1e-10);
    }
}
