//! Evaluation of final predictions.

use serde::Serialize;
use std::collections::BTreeSet;

/// Accuracy and macro-F1 of a prediction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalMetrics {
    pub accuracy: f64,
    /// Unweighted mean of per-label F1 over the gold labels
    pub macro_f1: f64,
    /// Indices predicted wrongly (abstentions included)
    pub wrong_indices: Vec<usize>,
}

impl EvalMetrics {
    /// Compare predictions with gold labels. A `None` prediction counts as wrong.
    pub fn compute(predictions: &[Option<String>], labels: &[String]) -> Self {
        let n = predictions.len().min(labels.len());
        let wrong_indices: Vec<usize> = (0..n)
            .filter(|&i| predictions[i].as_deref() != Some(labels[i].as_str()))
            .collect();
        let accuracy = if n == 0 {
            0.0
        } else {
            (n - wrong_indices.len()) as f64 / n as f64
        };

        let classes: BTreeSet<&str> = labels[..n].iter().map(String::as_str).collect();
        let f1s: Vec<f64> = classes
            .iter()
            .map(|&class| {
                let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
                for i in 0..n {
                    let predicted = predictions[i].as_deref() == Some(class);
                    let actual = labels[i] == class;
                    match (predicted, actual) {
                        (true, true) => tp += 1,
                        (true, false) => fp += 1,
                        (false, true) => fn_ += 1,
                        (false, false) => {}
                    }
                }
                if tp == 0 {
                    0.0
                } else {
                    2.0 * tp as f64 / (2 * tp + fp + fn_) as f64
                }
            })
            .collect();
        let macro_f1 = if f1s.is_empty() {
            0.0
        } else {
            f1s.iter().sum::<f64>() / f1s.len() as f64
        };

        Self {
            accuracy,
            macro_f1,
            wrong_indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect() {
        let gold = labels(&["a", "b", "a"]);
        let predicted: Vec<_> = gold.iter().cloned().map(Some).collect();
        let m = EvalMetrics::compute(&predicted, &gold);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.macro_f1, 1.0);
        assert!(m.wrong_indices.is_empty());
    }

    #[test]
    fn test_mixed_with_abstention() {
        let gold = labels(&["a", "a", "b", "b"]);
        let predicted = vec![Some("a".to_string()), None, Some("a".to_string()), Some("b".to_string())];
        let m = EvalMetrics::compute(&predicted, &gold);

        assert_eq!(m.accuracy, 0.5);
        assert_eq!(m.wrong_indices, vec![1, 2]);
        // a: tp 1, fp 1, fn 1 -> 0.5; b: tp 1, fp 0, fn 1 -> 2/3
        assert!((m.macro_f1 - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty() {
        let m = EvalMetrics::compute(&[], &[]);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.macro_f1, 0.0);
    }
}
