//! Bounding the bank after new hypotheses arrive.

use tracing::debug;

use crate::bank::HypothesisBank;

/// Merges new hypotheses into the bank and trims it to capacity.
pub trait ReplacePolicy: Send + Sync {
    /// Policy name.
    fn name(&self) -> &str;

    /// Capacity the result is bounded to.
    fn max_num_hypotheses(&self) -> usize;

    /// Combine `old` and `new` into a bank of at most
    /// [`max_num_hypotheses`](Self::max_num_hypotheses) entries.
    fn replace(&self, old: HypothesisBank, new: HypothesisBank, alpha: f64) -> HypothesisBank;
}

/// Union by hypothesis text (new overwrites old), then keep the highest
/// rewards. Equal rewards keep first-seen order and the result is stored
/// in rank order.
#[derive(Debug, Clone, Copy)]
pub struct DefaultReplace {
    max_num_hypotheses: usize,
}

impl DefaultReplace {
    pub fn new(max_num_hypotheses: usize) -> Self {
        Self { max_num_hypotheses }
    }
}

impl ReplacePolicy for DefaultReplace {
    fn name(&self) -> &str {
        "default"
    }

    fn max_num_hypotheses(&self) -> usize {
        self.max_num_hypotheses
    }

    fn replace(&self, old: HypothesisBank, new: HypothesisBank, _alpha: f64) -> HypothesisBank {
        let merged = old.merge(new);
        let kept = merged.top_by_reward(self.max_num_hypotheses);
        debug!(
            merged = merged.len(),
            kept = kept.len(),
            max = self.max_num_hypotheses,
            "Replaced hypotheses"
        );
        kept
    }
}
