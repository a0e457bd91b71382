//! Per-hypothesis statistics and the UCB reward.

use serde::{Deserialize, Serialize};

/// Upper-confidence reward: accuracy plus an exploration bonus that shrinks
/// as a hypothesis is evaluated on more examples.
///
/// `current_sample` below 1 is treated as 1 and `num_visits` of 0 as 1, so
/// the result is always finite.
pub fn reward_for(accuracy: f64, num_visits: u64, current_sample: usize, alpha: f64) -> f64 {
    let visits = num_visits.max(1) as f64;
    let sample = current_sample.max(1) as f64;
    accuracy + alpha * (sample.ln() / visits).sqrt()
}

/// Statistics for one candidate hypothesis.
///
/// The hypothesis text is the key of the bank it lives in, so it is not
/// part of the serialized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryInformation {
    /// Hypothesis text
    #[serde(skip)]
    pub hypothesis: String,
    /// Accuracy on the most recent evaluation window (0.0 - 1.0)
    #[serde(alias = "acc")]
    pub accuracy: f64,
    /// Examples this hypothesis has been evaluated on
    #[serde(default)]
    pub num_visits: u64,
    /// UCB reward used for ranking
    #[serde(default)]
    pub reward: f64,
    /// `(example index, label)` pairs it predicted correctly
    #[serde(default)]
    pub correct_examples: Vec<(usize, String)>,
}

impl SummaryInformation {
    /// Create zeroed statistics for a newly generated hypothesis.
    pub fn new(hypothesis: impl Into<String>) -> Self {
        Self {
            hypothesis: hypothesis.into(),
            accuracy: 0.0,
            num_visits: 0,
            reward: 0.0,
            correct_examples: Vec::new(),
        }
    }

    /// Set accuracy and visits directly.
    pub fn with_stats(mut self, accuracy: f64, num_visits: u64) -> Self {
        self.accuracy = accuracy;
        self.num_visits = num_visits;
        self
    }

    /// Attach correct examples.
    pub fn with_correct_examples(mut self, examples: Vec<(usize, String)>) -> Self {
        self.correct_examples = examples;
        self
    }

    /// Record an evaluation window.
    ///
    /// `hits` are the examples predicted correctly out of `window_len`
    /// evaluated. Accuracy becomes the window's hit rate; visits and correct
    /// examples accumulate. An empty window changes nothing.
    pub fn record_window(&mut self, hits: Vec<(usize, String)>, window_len: usize) {
        if window_len == 0 {
            return;
        }
        self.accuracy = hits.len() as f64 / window_len as f64;
        self.num_visits += window_len as u64;
        self.correct_examples.extend(hits);
    }

    /// Recompute the reward for the given sample position.
    pub fn update_reward(&mut self, current_sample: usize, alpha: f64) {
        self.reward = reward_for(self.accuracy, self.num_visits, current_sample, alpha);
    }

    /// Whether this hypothesis was correct on a training example.
    pub fn was_correct_on(&self, index: usize) -> bool {
        self.correct_examples.iter().any(|(i, _)| *i == index)
    }
}
