//! Similarity-based hypothesis selection.
//!
//! Each hypothesis is encoded as a 0/1 vector over training examples (1 where
//! it predicted the example correctly). Two hypotheses whose vectors have
//! cosine similarity at or above a threshold are considered redundant, and a
//! maximum-accuracy set with no redundant pair is chosen: a maximum weight
//! independent set over the similarity graph.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bank::HypothesisBank;
use crate::error::{HypogenError, Result};

/// Indicator vectors for every hypothesis in bank order.
///
/// Vectors have length `max(num_train, largest correct index + 1)`.
pub fn indicator_vectors(bank: &HypothesisBank, num_train: usize) -> Vec<Vec<f64>> {
    let len = bank
        .iter()
        .flat_map(|s| s.correct_examples.iter().map(|(i, _)| i + 1))
        .max()
        .unwrap_or(0)
        .max(num_train);

    bank.iter()
        .map(|summary| {
            let mut v = vec![0.0; len];
            for (i, _) in &summary.correct_examples {
                v[*i] = 1.0;
            }
            v
        })
        .collect()
}

/// Cosine similarity of two vectors. A zero vector is similar to nothing.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Pairwise similarity matrix with a zero diagonal.
pub fn similarity_matrix(vectors: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s = cosine_similarity(&vectors[i], &vectors[j]);
            matrix[i][j] = s;
            matrix[j][i] = s;
        }
    }
    matrix
}

/// Solves the selection program: maximize the summed weight of chosen
/// items such that no two chosen items have similarity >= threshold.
pub trait SelectionSolver: Send + Sync {
    /// Solver name.
    fn name(&self) -> &str;

    /// Chosen indices, ascending.
    fn solve(&self, similarity: &[Vec<f64>], weights: &[f64], threshold: f64) -> Vec<usize>;
}

fn conflicts(similarity: &[Vec<f64>], threshold: f64) -> Vec<Vec<bool>> {
    similarity
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, &s)| i != j && s >= threshold)
                .collect()
        })
        .collect()
}

/// Order indices by weight, heaviest first, ties by index.
fn by_weight(weights: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));
    order
}

/// Exact solver: depth-first branch and bound over items in weight order.
///
/// Worst case is exponential in the number of items; bank-sized inputs
/// (tens of hypotheses) solve instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBoundSolver;

struct Search<'a> {
    conflict: &'a [Vec<bool>],
    weights: &'a [f64],
    current: Vec<usize>,
    best: Vec<usize>,
    best_weight: f64,
}

impl Search<'_> {
    fn run(&mut self, candidates: &[usize], weight: f64) {
        let Some((&v, rest)) = candidates.split_first() else {
            if weight > self.best_weight {
                self.best_weight = weight;
                self.best = self.current.clone();
            }
            return;
        };

        let bound = weight
            + candidates
                .iter()
                .map(|&c| self.weights[c].max(0.0))
                .sum::<f64>();
        if bound <= self.best_weight {
            return;
        }

        let compatible: Vec<usize> = rest
            .iter()
            .copied()
            .filter(|&u| !self.conflict[v][u])
            .collect();
        self.current.push(v);
        self.run(&compatible, weight + self.weights[v]);
        self.current.pop();

        self.run(rest, weight);
    }
}

impl SelectionSolver for BranchAndBoundSolver {
    fn name(&self) -> &str {
        "branch_and_bound"
    }

    fn solve(&self, similarity: &[Vec<f64>], weights: &[f64], threshold: f64) -> Vec<usize> {
        let conflict = conflicts(similarity, threshold);
        let mut search = Search {
            conflict: &conflict,
            weights,
            current: Vec::new(),
            best: Vec::new(),
            best_weight: f64::NEG_INFINITY,
        };
        search.run(&by_weight(weights), 0.0);

        let mut chosen = search.best;
        chosen.sort_unstable();
        chosen
    }
}

/// Approximate solver: take items heaviest first, skipping any that
/// conflict with one already taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver;

impl SelectionSolver for GreedySolver {
    fn name(&self) -> &str {
        "greedy"
    }

    fn solve(&self, similarity: &[Vec<f64>], weights: &[f64], threshold: f64) -> Vec<usize> {
        let conflict = conflicts(similarity, threshold);
        let mut chosen: Vec<usize> = Vec::new();
        for v in by_weight(weights) {
            if chosen.iter().all(|&u| !conflict[v][u]) {
                chosen.push(v);
            }
        }
        chosen.sort_unstable();
        chosen
    }
}

/// Named solver choice for configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Exact
    #[default]
    BranchAndBound,
    /// Approximate
    Greedy,
}

impl SolverKind {
    /// Build the solver.
    pub fn build(self) -> Arc<dyn SelectionSolver> {
        match self {
            SolverKind::BranchAndBound => Arc::new(BranchAndBoundSolver),
            SolverKind::Greedy => Arc::new(GreedySolver),
        }
    }
}

impl FromStr for SolverKind {
    type Err = HypogenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "branch_and_bound" => Ok(SolverKind::BranchAndBound),
            "greedy" => Ok(SolverKind::Greedy),
            other => Err(HypogenError::ConfigError(format!(
                "unknown solver '{}'",
                other
            ))),
        }
    }
}

/// A hypothesis chosen for adaptive inference with its supporting examples.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedHypothesis {
    pub hypothesis: String,
    pub accuracy: f64,
    /// Down-sampled correct examples
    pub examples: Vec<(usize, String)>,
}

/// Picks a small, non-redundant, high-accuracy subset of a bank.
#[derive(Clone)]
pub struct AdaptiveSelector {
    /// Similarity at or above which two hypotheses conflict
    pub threshold: f64,
    /// Hypotheses to keep
    pub num_hypotheses: usize,
    /// Supporting examples to keep per hypothesis
    pub num_examples: usize,
    solver: Arc<dyn SelectionSolver>,
}

impl AdaptiveSelector {
    /// Create a selector using the exact solver.
    pub fn new(threshold: f64, num_hypotheses: usize, num_examples: usize) -> Self {
        Self {
            threshold,
            num_hypotheses,
            num_examples,
            solver: Arc::new(BranchAndBoundSolver),
        }
    }

    /// Use a different solver.
    pub fn with_solver(mut self, solver: Arc<dyn SelectionSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Select hypotheses from a bank.
    ///
    /// Fewer feasible hypotheses than requested returns all feasible ones.
    /// Asking for more hypotheses than the bank holds is a configuration error.
    pub fn select<R: Rng + ?Sized>(
        &self,
        bank: &HypothesisBank,
        num_train: usize,
        rng: &mut R,
    ) -> Result<Vec<SelectedHypothesis>> {
        if self.num_hypotheses > bank.len() {
            return Err(HypogenError::ConfigError(format!(
                "adaptive selection asks for {} hypotheses but the bank holds {}",
                self.num_hypotheses,
                bank.len()
            )));
        }

        let vectors = indicator_vectors(bank, num_train);
        let similarity = similarity_matrix(&vectors);
        let summaries: Vec<_> = bank.iter().collect();
        let weights: Vec<f64> = summaries.iter().map(|s| s.accuracy).collect();

        let feasible = self.solver.solve(&similarity, &weights, self.threshold);
        debug!(
            solver = self.solver.name(),
            feasible = feasible.len(),
            threshold = self.threshold,
            "Solved selection program"
        );

        let mut kept: Vec<_> = feasible.into_iter().map(|i| summaries[i]).collect();
        kept.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));
        kept.truncate(self.num_hypotheses);

        let selected: Vec<SelectedHypothesis> = kept
            .into_iter()
            .map(|summary| {
                let examples = if summary.correct_examples.len() > self.num_examples {
                    summary
                        .correct_examples
                        .choose_multiple(rng, self.num_examples)
                        .cloned()
                        .collect()
                } else {
                    summary.correct_examples.clone()
                };
                SelectedHypothesis {
                    hypothesis: summary.hypothesis.clone(),
                    accuracy: summary.accuracy,
                    examples,
                }
            })
            .collect();

        info!(
            bank_size = bank.len(),
            selected = selected.len(),
            "Adaptive selection done"
        );
        Ok(selected)
    }
}
