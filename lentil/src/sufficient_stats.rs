//! Sufficient statistics for collapsed Gibbs topic models.
//!
//! Tracks the K×V weighted topic-word counts, the D×K document-topic
//! counts, and per-topic totals (weighted and unweighted).
//!
//! A token is moved by `remove` (old topic) followed by `add` (new topic),
//! so between token updates the tables always match the assignments.

use crate::common::{DVec, Mat};
use crate::corpus::Corpus;
use crate::vocab_weights::VocabWeights;

/// Sufficient statistics of a topic assignment.
///
/// All arrays use topic indices in `0..num_topics`.
#[derive(Debug, Clone)]
pub struct SufficientStats {
    /// Number of topics
    pub num_topics: usize,
    /// Number of vocabulary words
    pub num_vocab: usize,
    /// K×V weighted word counts per topic
    pub topic_word: Mat,
    /// D×K unweighted topic counts per document
    pub doc_topic: Mat,
    /// Weighted total per topic (row sums of `topic_word`)
    pub topic_total: DVec,
    /// Unweighted total per topic
    pub topic_total_unweighted: DVec,
    /// Number of tokens per document
    pub doc_len: Vec<usize>,
    weights: VocabWeights,
}

impl SufficientStats {
    /// Build sufficient statistics from the current assignments.
    ///
    /// * `corpus` - documents with topic assignments in `0..num_topics`
    /// * `weights` - per-word weights (all ones for plain counts)
    /// * `num_topics` - number of topics
    pub fn from_corpus(corpus: &Corpus, weights: VocabWeights, num_topics: usize) -> Self {
        debug_assert_eq!(weights.num_vocab(), corpus.num_vocab);

        let mut stats = SufficientStats {
            num_topics,
            num_vocab: corpus.num_vocab,
            topic_word: Mat::zeros(num_topics, corpus.num_vocab),
            doc_topic: Mat::zeros(corpus.num_docs(), num_topics),
            topic_total: DVec::zeros(num_topics),
            topic_total_unweighted: DVec::zeros(num_topics),
            doc_len: corpus.doc_lengths(),
            weights,
        };
        stats.accumulate(corpus);
        stats
    }

    fn accumulate(&mut self, corpus: &Corpus) {
        for (d, doc) in corpus.docs.iter().enumerate() {
            for (&w, &z) in doc.words.iter().zip(doc.topics.iter()) {
                self.add(d, z, w);
            }
        }
    }

    pub fn num_docs(&self) -> usize {
        self.doc_len.len()
    }

    pub fn total_tokens(&self) -> usize {
        self.doc_len.iter().sum()
    }

    #[inline]
    pub fn weight(&self, word: usize) -> f64 {
        self.weights.get(word)
    }

    pub fn vocab_weights(&self) -> &VocabWeights {
        &self.weights
    }

    /// Take one token of `word` in `doc` out of `topic`.
    #[inline]
    pub fn remove(&mut self, doc: usize, topic: usize, word: usize) {
        let wt = self.weights.get(word);
        self.topic_word[(topic, word)] -= wt;
        self.topic_total[topic] -= wt;
        self.topic_total_unweighted[topic] -= 1.0;
        self.doc_topic[(doc, topic)] -= 1.0;

        debug_assert!(
            self.doc_topic[(doc, topic)] >= 0.0 && self.topic_total_unweighted[topic] >= 0.0,
            "negative count after removing word {} from topic {} in document {}",
            word,
            topic,
            doc
        );
    }

    /// Put one token of `word` in `doc` into `topic`.
    #[inline]
    pub fn add(&mut self, doc: usize, topic: usize, word: usize) {
        let wt = self.weights.get(word);
        self.topic_word[(topic, word)] += wt;
        self.topic_total[topic] += wt;
        self.topic_total_unweighted[topic] += 1.0;
        self.doc_topic[(doc, topic)] += 1.0;
    }

    /// Full recomputation from the assignments.
    ///
    /// This is useful for periodic recalibration to avoid floating-point
    /// drift from many incremental add/remove updates.
    pub fn recompute(&mut self, corpus: &Corpus) {
        self.topic_word.fill(0.0);
        self.doc_topic = Mat::zeros(corpus.num_docs(), self.num_topics);
        self.topic_total.fill(0.0);
        self.topic_total_unweighted.fill(0.0);
        self.doc_len = corpus.doc_lengths();
        self.accumulate(corpus);
    }

    /// Largest absolute difference between these tables and ones rebuilt
    /// from `corpus`, together with the internal row-sum identities.
    pub fn max_discrepancy(&self, corpus: &Corpus) -> f64 {
        let fresh = SufficientStats::from_corpus(corpus, self.weights.clone(), self.num_topics);

        let mut err = (&self.topic_word - &fresh.topic_word).amax();
        err = err.max((&self.doc_topic - &fresh.doc_topic).amax());
        err = err.max((&self.topic_total - &fresh.topic_total).amax());
        err = err.max((&self.topic_total_unweighted - &fresh.topic_total_unweighted).amax());

        for k in 0..self.num_topics {
            let row_sum: f64 = self.topic_word.row(k).sum();
            err = err.max((row_sum - self.topic_total[k]).abs());
        }
        for (d, &len) in self.doc_len.iter().enumerate() {
            let row_sum: f64 = self.doc_topic.row(d).sum();
            err = err.max((row_sum - len as f64).abs());
        }
        err
    }

    /// Fail if the tables have drifted away from the assignments.
    pub fn check_consistency(&self, corpus: &Corpus, tol: f64) -> anyhow::Result<()> {
        let err = self.max_discrepancy(corpus);
        if !(err <= tol) {
            anyhow::bail!(
                "count tables are inconsistent with the assignments (max error {:.3e} > {:.1e})",
                err,
                tol
            );
        }
        Ok(())
    }
}
