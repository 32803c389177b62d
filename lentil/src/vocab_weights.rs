//! Information-content weights of vocabulary words.
//!
//! Each word `w` is weighted by `-log2 p(w)`, where `p(w)` is its corpus
//! frequency after adding one pseudo-count to every word, so rare words
//! contribute more mass to the topic-word tables than frequent ones.

use crate::common::DVec;
use crate::corpus::Corpus;

#[derive(Debug, Clone)]
pub struct VocabWeights {
    weights: DVec,
    weighted: bool,
}

impl VocabWeights {
    /// Compute weights from corpus frequencies, or all ones if `use_weights` is off.
    pub fn from_corpus(corpus: &Corpus, use_weights: bool) -> Self {
        if !use_weights {
            return Self::uniform(corpus.num_vocab);
        }

        let mut counts = DVec::from_element(corpus.num_vocab, 1.0);
        for doc in &corpus.docs {
            for &w in &doc.words {
                counts[w] += 1.0;
            }
        }

        let total = counts.sum();
        let weights = counts.map(|c| -(c / total).log2());

        VocabWeights {
            weights,
            weighted: true,
        }
    }

    pub fn uniform(num_vocab: usize) -> Self {
        VocabWeights {
            weights: DVec::from_element(num_vocab, 1.0),
            weighted: false,
        }
    }

    #[inline]
    pub fn get(&self, word: usize) -> f64 {
        self.weights[word]
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn num_vocab(&self) -> usize {
        self.weights.len()
    }

    pub fn as_vector(&self) -> &DVec {
        &self.weights
    }
}
