//! HypothesisBank - insertion-ordered hypothesis text to statistics map.
//!
//! Serialized as a JSON object in bank order, so a bank written to disk and
//! read back keeps its ranking and produces byte-identical output.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::summary::SummaryInformation;

/// Ordered set of hypotheses keyed by their text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HypothesisBank {
    entries: Vec<SummaryInformation>,
    index: HashMap<String, usize>,
}

impl HypothesisBank {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hypotheses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bank is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a hypothesis. A colliding key is overwritten in place.
    pub fn insert(&mut self, summary: SummaryInformation) {
        match self.index.get(&summary.hypothesis) {
            Some(&pos) => self.entries[pos] = summary,
            None => {
                self.index
                    .insert(summary.hypothesis.clone(), self.entries.len());
                self.entries.push(summary);
            }
        }
    }

    /// Look up a hypothesis.
    pub fn get(&self, hypothesis: &str) -> Option<&SummaryInformation> {
        self.index.get(hypothesis).map(|&pos| &self.entries[pos])
    }

    /// Look up a hypothesis for mutation.
    pub fn get_mut(&mut self, hypothesis: &str) -> Option<&mut SummaryInformation> {
        match self.index.get(hypothesis) {
            Some(&pos) => self.entries.get_mut(pos),
            None => None,
        }
    }

    /// Whether the bank holds a hypothesis.
    pub fn contains(&self, hypothesis: &str) -> bool {
        self.index.contains_key(hypothesis)
    }

    /// Iterate in bank order.
    pub fn iter(&self) -> impl Iterator<Item = &SummaryInformation> {
        self.entries.iter()
    }

    /// Iterate mutably in bank order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SummaryInformation> {
        self.entries.iter_mut()
    }

    /// Hypothesis texts in bank order.
    pub fn hypotheses(&self) -> Vec<&str> {
        self.entries.iter().map(|s| s.hypothesis.as_str()).collect()
    }

    /// Union of two banks. Entries of `other` overwrite colliding keys.
    pub fn merge(mut self, other: HypothesisBank) -> Self {
        for summary in other.entries {
            self.insert(summary);
        }
        self
    }

    /// Entries by reward, highest first. Equal rewards keep bank order.
    pub fn ranked_by_reward(&self) -> Vec<&SummaryInformation> {
        let mut ranked: Vec<&SummaryInformation> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.reward.total_cmp(&a.reward));
        ranked
    }

    /// The `k` lowest-reward hypotheses, lowest first. Equal rewards keep bank order.
    pub fn lowest_by_reward(&self, k: usize) -> Vec<String> {
        let mut ranked: Vec<&SummaryInformation> = self.entries.iter().collect();
        ranked.sort_by(|a, b| a.reward.total_cmp(&b.reward));
        ranked
            .into_iter()
            .take(k)
            .map(|s| s.hypothesis.clone())
            .collect()
    }

    /// The `k` most accurate hypotheses, best first. Equal accuracies keep bank order.
    pub fn top_by_accuracy(&self, k: usize) -> Vec<&SummaryInformation> {
        let mut ranked: Vec<&SummaryInformation> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));
        ranked.truncate(k);
        ranked
    }

    /// The single most accurate hypothesis.
    pub fn best_by_accuracy(&self) -> Option<&SummaryInformation> {
        self.top_by_accuracy(1).into_iter().next()
    }

    /// Keep the `max` highest-reward hypotheses, stored in rank order.
    pub fn top_by_reward(&self, max: usize) -> Self {
        self.ranked_by_reward()
            .into_iter()
            .take(max)
            .cloned()
            .collect()
    }

    /// Recompute every reward for the given sample position.
    pub fn refresh_rewards(&mut self, current_sample: usize, alpha: f64) {
        for summary in &mut self.entries {
            summary.update_reward(current_sample, alpha);
        }
    }

    /// Subset of this bank holding the named hypotheses, in the given order.
    pub fn subset(&self, hypotheses: &[&str]) -> Self {
        hypotheses
            .iter()
            .filter_map(|h| self.get(h))
            .cloned()
            .collect()
    }

    /// Serialize as pretty JSON.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl FromIterator<SummaryInformation> for HypothesisBank {
    fn from_iter<I: IntoIterator<Item = SummaryInformation>>(iter: I) -> Self {
        let mut bank = HypothesisBank::new();
        for summary in iter {
            bank.insert(summary);
        }
        bank
    }
}

impl IntoIterator for HypothesisBank {
    type Item = SummaryInformation;
    type IntoIter = std::vec::IntoIter<SummaryInformation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for HypothesisBank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for summary in &self.entries {
            map.serialize_entry(&summary.hypothesis, summary)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HypothesisBank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BankVisitor;

        impl<'de> Visitor<'de> for BankVisitor {
            type Value = HypothesisBank;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of hypothesis text to summary information")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut bank = HypothesisBank::new();
                while let Some((hypothesis, mut summary)) =
                    access.next_entry::<String, SummaryInformation>()?
                {
                    summary.hypothesis = hypothesis;
                    bank.insert(summary);
                }
                Ok(bank)
            }
        }

        deserializer.deserialize_map(BankVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(h: &str, accuracy: f64, reward: f64) -> SummaryInformation {
        let mut s = SummaryInformation::new(h).with_stats(accuracy, 10);
        s.reward = reward;
        s
    }

    fn bank() -> HypothesisBank {
        vec![
            summary("c", 0.2, 0.9),
            summary("a", 0.8, 0.4),
            summary("b", 0.8, 0.9),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut bank = bank();
        bank.insert(summary("a", 0.1, 0.1));

        assert_eq!(bank.len(), 3);
        assert_eq!(bank.hypotheses(), vec!["c", "a", "b"]);
        assert_eq!(bank.get("a").unwrap().accuracy, 0.1);
    }

    #[test]
    fn test_rankings_are_stable() {
        let bank = bank();

        let ranked: Vec<&str> = bank
            .ranked_by_reward()
            .iter()
            .map(|s| s.hypothesis.as_str())
            .collect();
        assert_eq!(ranked, vec!["c", "b", "a"]);

        assert_eq!(bank.lowest_by_reward(2), vec!["a", "c"]);

        let top: Vec<&str> = bank
            .top_by_accuracy(2)
            .iter()
            .map(|s| s.hypothesis.as_str())
            .collect();
        assert_eq!(top, vec!["a", "b"]);
        assert_eq!(bank.best_by_accuracy().unwrap().hypothesis, "a");
    }

    #[test]
    fn test_top_by_reward_is_rank_ordered() {
        let trimmed = bank().top_by_reward(2);
        assert_eq!(trimmed.hypotheses(), vec!["c", "b"]);
    }

    #[test]
    fn test_merge_overwrites() {
        let other: HypothesisBank = vec![summary("b", 0.0, 0.0), summary("d", 0.5, 0.5)]
            .into_iter()
            .collect();
        let merged = bank().merge(other);

        assert_eq!(merged.hypotheses(), vec!["c", "a", "b", "d"]);
        assert_eq!(merged.get("b").unwrap().reward, 0.0);
    }

    #[test]
    fn test_json_preserves_order() {
        let mut bank = bank();
        bank.get_mut("c").unwrap().correct_examples = vec![(1, "x".to_string())];

        let json = bank.to_json_string().unwrap();
        let back = HypothesisBank::from_json_str(&json).unwrap();

        assert_eq!(back, bank);
        assert_eq!(back.hypotheses(), vec!["c", "a", "b"]);
        assert_eq!(back.to_json_string().unwrap(), json);
    }

    #[test]
    fn test_subset() {
        let sub = bank().subset(&["b", "missing", "c"]);
        assert_eq!(sub.hypotheses(), vec!["b", "c"]);
    }
}
