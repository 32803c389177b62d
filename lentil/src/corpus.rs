//! Tokenized documents with their current topic assignments.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Parallel word and topic sequences of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub words: Vec<usize>,
    pub topics: Vec<usize>,
}

impl Document {
    pub fn new(words: Vec<usize>, topics: Vec<usize>) -> Self {
        Document { words, topics }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// An ordered collection of documents over a fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub docs: Vec<Document>,
    pub num_vocab: usize,
}

impl Corpus {
    pub fn new(docs: Vec<Document>, num_vocab: usize) -> Self {
        Corpus { docs, num_vocab }
    }

    /// Pair up word and topic sequences, one of each per document.
    pub fn from_sequences(
        words: Vec<Vec<usize>>,
        topics: Vec<Vec<usize>>,
        num_vocab: usize,
    ) -> anyhow::Result<Self> {
        if words.len() != topics.len() {
            anyhow::bail!(
                "{} word sequences but {} topic sequences",
                words.len(),
                topics.len()
            );
        }
        let docs = words
            .into_iter()
            .zip(topics)
            .map(|(w, z)| Document::new(w, z))
            .collect();
        Ok(Corpus::new(docs, num_vocab))
    }

    /// Assign every token a uniformly random topic.
    pub fn with_random_topics<R: Rng + ?Sized>(
        words: Vec<Vec<usize>>,
        num_vocab: usize,
        num_topics: usize,
        rng: &mut R,
    ) -> anyhow::Result<Self> {
        if num_topics == 0 {
            anyhow::bail!("need at least one topic to assign");
        }
        let docs = words
            .into_iter()
            .map(|w| {
                let z = w.iter().map(|_| rng.random_range(0..num_topics)).collect();
                Document::new(w, z)
            })
            .collect();
        Ok(Corpus::new(docs, num_vocab))
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn doc_lengths(&self) -> Vec<usize> {
        self.docs.iter().map(Document::len).collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.docs.iter().map(Document::len).sum()
    }

    pub fn topic_sequences(&self) -> Vec<Vec<usize>> {
        self.docs.iter().map(|d| d.topics.clone()).collect()
    }

    /// Check sequence lengths and index ranges before any sampling.
    pub fn validate(&self, num_topics: usize) -> anyhow::Result<()> {
        if self.num_vocab == 0 {
            anyhow::bail!("empty vocabulary");
        }
        if num_topics == 0 {
            anyhow::bail!("need at least one topic");
        }

        for (d, doc) in self.docs.iter().enumerate() {
            if doc.words.len() != doc.topics.len() {
                anyhow::bail!(
                    "document {}: {} words but {} topic assignments",
                    d,
                    doc.words.len(),
                    doc.topics.len()
                );
            }
            if let Some(&w) = doc.words.iter().find(|&&w| w >= self.num_vocab) {
                anyhow::bail!(
                    "document {}: word index {} out of range (vocabulary size {})",
                    d,
                    w,
                    self.num_vocab
                );
            }
            if let Some(&z) = doc.topics.iter().find(|&&z| z >= num_topics) {
                anyhow::bail!(
                    "document {}: topic index {} out of range ({} topics)",
                    d,
                    z,
                    num_topics
                );
            }
        }
        Ok(())
    }
}
