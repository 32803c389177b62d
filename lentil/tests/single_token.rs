//! One token resample on a tiny corpus with a scripted random source.

use lentil::{Corpus, Document, FitOptions, Priors, TopicModel};
use rand::RngCore;

/// Returns the same word forever.
struct FixedRng(u64);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for (i, b) in dst.iter_mut().enumerate() {
            *b = self.0.to_le_bytes()[i % 8];
        }
    }
}

fn two_doc_model() -> TopicModel {
    let _ = env_logger::builder().is_test(true).try_init();

    let corpus = Corpus::new(
        vec![
            Document::new(vec![0, 0, 1], vec![0, 0, 1]),
            Document::new(vec![2, 2, 1], vec![1, 1, 0]),
        ],
        3,
    );
    let options = FitOptions {
        use_weights: false,
        priors: Priors {
            beta: 0.1,
            alpha: 1.0,
        },
        ..FitOptions::with_topics(2)
    };
    TopicModel::lda_with_alpha(corpus, vec![1.0, 1.0], options).unwrap()
}

// Without the last token of document 0 (word 1, topic 1) the weights are
//   topic 0: (0.1 + 1)(2 + 1) / (0.3 + 3) = 1
//   topic 1: (0.1 + 0)(0 + 1) / (0.3 + 2) = 0.0435
// so a uniform draw of 0 picks topic 0 and a draw just below 1 picks topic 1.

#[test]
fn test_low_draw_moves_token_to_topic_zero() {
    let mut model = two_doc_model();
    let mut rng = FixedRng(0);

    let topic = model.resample_token(0, 2, &mut rng).unwrap();
    assert_eq!(topic, 0);

    let stats = model.stats();
    assert_eq!(stats.topic_word[(0, 1)], 2.0);
    assert_eq!(stats.topic_word[(1, 1)], 0.0);
    assert_eq!(stats.doc_topic[(0, 0)], 3.0);
    assert_eq!(stats.doc_topic[(0, 1)], 0.0);
    assert_eq!(stats.topic_total[0], 4.0);
    assert_eq!(stats.topic_total[1], 2.0);
    assert_eq!(model.corpus().docs[0].topics, vec![0, 0, 0]);
}

#[test]
fn test_high_draw_keeps_token_in_topic_one() {
    let mut model = two_doc_model();
    let before = model.stats().clone();
    let mut rng = FixedRng(u64::MAX);

    let topic = model.resample_token(0, 2, &mut rng).unwrap();
    assert_eq!(topic, 1);

    let stats = model.stats();
    assert_eq!(stats.topic_word, before.topic_word);
    assert_eq!(stats.doc_topic, before.doc_topic);
    assert_eq!(stats.topic_total, before.topic_total);
    assert_eq!(model.corpus().docs[0].topics, vec![0, 0, 1]);
}
