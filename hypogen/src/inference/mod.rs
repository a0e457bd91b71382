//! Inference strategies.
//!
//! Every strategy turns `(example, hypotheses)` requests into label
//! predictions by prompting the model:
//!
//! - **default**: one prompt per request embedding its hypotheses
//! - **filter_and_weight**: keep relevant hypotheses, accuracy-weighted vote
//! - **relevance**: predict only with hypotheses judged relevant
//! - **one_step_adaptive**: one prompt with selected hypotheses and their examples
//! - **two_step_adaptive**: selection, then filter and weight
//! - **upperbound**: oracle-style combination using stored correct examples
//!
//! A prediction is `None` when the model call behind it failed.

mod adaptive;
mod default;
mod filter_and_weight;
mod relevance;
mod upperbound;

pub use adaptive::{OneStepAdaptiveInference, TwoStepAdaptiveInference};
pub use default::DefaultInference;
pub use filter_and_weight::FilterAndWeightInference;
pub use relevance::{extract_relevance, RelevanceInference};
pub use upperbound::UpperboundInference;

use async_trait::async_trait;
use hypogen_agent::{LlmClient, Prompt};
use hypogen_task::{Dataset, Task, OTHER_LABEL};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::bank::HypothesisBank;
use crate::error::{HypogenError, Result};
use crate::selection::{AdaptiveSelector, SolverKind};
use crate::summary::SummaryInformation;

/// The closed set of inference strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStyle {
    #[default]
    Default,
    FilterAndWeight,
    OneStepAdaptive,
    TwoStepAdaptive,
    Relevance,
    Upperbound,
}

impl InferenceStyle {
    /// All styles.
    pub const ALL: [InferenceStyle; 6] = [
        InferenceStyle::Default,
        InferenceStyle::FilterAndWeight,
        InferenceStyle::OneStepAdaptive,
        InferenceStyle::TwoStepAdaptive,
        InferenceStyle::Relevance,
        InferenceStyle::Upperbound,
    ];

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceStyle::Default => "default",
            InferenceStyle::FilterAndWeight => "filter_and_weight",
            InferenceStyle::OneStepAdaptive => "one_step_adaptive",
            InferenceStyle::TwoStepAdaptive => "two_step_adaptive",
            InferenceStyle::Relevance => "relevance",
            InferenceStyle::Upperbound => "upperbound",
        }
    }

    /// Whether the style runs adaptive selection first.
    pub fn is_adaptive(&self) -> bool {
        matches!(
            self,
            InferenceStyle::OneStepAdaptive | InferenceStyle::TwoStepAdaptive
        )
    }
}

impl fmt::Display for InferenceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceStyle {
    type Err = HypogenError;

    fn from_str(s: &str) -> Result<Self> {
        InferenceStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| HypogenError::ConfigError(format!("unknown inference style '{}'", s)))
    }
}

/// Shared collaborators of every strategy.
#[derive(Clone)]
pub struct InferenceContext {
    /// Model caller
    pub client: Arc<LlmClient>,
    /// Prompts and label extraction
    pub task: Arc<Task>,
    /// Training examples that correct-example indices refer to
    pub train: Arc<Dataset>,
    /// Response cache seed
    pub cache_seed: Option<u64>,
    /// In-flight call limit for batched calls
    pub max_concurrent: usize,
}

impl InferenceContext {
    async fn generate_all(&self, prompts: &[Prompt]) -> Vec<Option<String>> {
        self.client
            .batched_generate(prompts, self.cache_seed, self.max_concurrent)
            .await
    }

    fn extract(&self, response: Option<&str>) -> Option<String> {
        response.map(|text| self.task.extractor().extract(Some(text)))
    }
}

/// One example to predict with a set of hypotheses.
#[derive(Debug, Clone)]
pub struct PredictionRequest<'a> {
    pub index: usize,
    pub hypotheses: Vec<&'a SummaryInformation>,
}

impl<'a> PredictionRequest<'a> {
    pub fn new(index: usize, hypotheses: Vec<&'a SummaryInformation>) -> Self {
        Self { index, hypotheses }
    }

    fn texts(&self) -> Vec<&str> {
        self.hypotheses
            .iter()
            .map(|s| s.hypothesis.as_str())
            .collect()
    }
}

/// Predictions aligned 1:1 with ground-truth labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    pub predictions: Vec<Option<String>>,
    pub labels: Vec<String>,
}

/// Options for inference over a whole dataset.
#[derive(Debug, Clone)]
pub struct FinalOptions {
    /// Hypotheses considered by filtering strategies
    pub k: usize,
    /// Similarity at or above which two hypotheses are redundant
    pub adaptive_threshold: f64,
    /// Hypotheses kept by adaptive selection
    pub adaptive_num_hypotheses: usize,
    /// Supporting examples kept per selected hypothesis
    pub adaptive_num_examples: usize,
    /// Selection solver
    pub solver: SolverKind,
}

impl Default for FinalOptions {
    fn default() -> Self {
        Self {
            k: 5,
            adaptive_threshold: 0.7,
            adaptive_num_hypotheses: 5,
            adaptive_num_examples: 0,
            solver: SolverKind::BranchAndBound,
        }
    }
}

impl FinalOptions {
    /// Selector configured from these options.
    pub fn selector(&self) -> AdaptiveSelector {
        AdaptiveSelector::new(
            self.adaptive_threshold,
            self.adaptive_num_hypotheses,
            self.adaptive_num_examples,
        )
        .with_solver(self.solver.build())
    }
}

/// Common contract of the inference strategies.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Strategy style.
    fn style(&self) -> InferenceStyle;

    /// Predict one example.
    async fn predict(
        &self,
        data: &Dataset,
        index: usize,
        hypotheses: &[&SummaryInformation],
    ) -> Result<(Option<String>, String)> {
        let request = PredictionRequest::new(index, hypotheses.to_vec());
        let mut out = self.batched_predict(data, &[request]).await?;
        match (out.predictions.pop(), out.labels.pop()) {
            (Some(prediction), Some(label)) => Ok((prediction, label)),
            _ => Err(HypogenError::InvalidState(
                "batched prediction returned no result".to_string(),
            )),
        }
    }

    /// Predict a batch. Output is aligned 1:1 with `requests`.
    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions>;

    /// Predict every example of `data` using the bank.
    async fn run_inference_final(
        &self,
        data: &Dataset,
        bank: &HypothesisBank,
        options: &FinalOptions,
        rng: &mut StdRng,
    ) -> Result<Predictions>;
}

fn require_hypotheses(requests: &[PredictionRequest<'_>]) -> Result<()> {
    match requests.iter().find(|r| r.hypotheses.is_empty()) {
        Some(empty) => Err(HypogenError::EmptyHypotheses(empty.index)),
        None => Ok(()),
    }
}

fn labels_for(data: &Dataset, indices: impl Iterator<Item = usize>) -> Result<Vec<String>> {
    indices
        .map(|i| data.label(i).map(str::to_string).map_err(HypogenError::from))
        .collect()
}

fn require_nonempty(bank: &HypothesisBank) -> Result<()> {
    if bank.is_empty() {
        return Err(HypogenError::ConfigError(
            "hypothesis bank is empty".to_string(),
        ));
    }
    Ok(())
}

/// Weighted vote over labels. `"other"` never wins; a tie or no votes gives `"other"`.
fn weighted_vote<'a>(votes: impl IntoIterator<Item = (&'a str, f64)>) -> String {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for (label, weight) in votes {
        if label != OTHER_LABEL {
            *totals.entry(label).or_insert(0.0) += weight;
        }
    }

    let Some(max) = totals.values().copied().max_by(f64::total_cmp) else {
        return OTHER_LABEL.to_string();
    };
    let mut winners = totals.iter().filter(|(_, &w)| w == max);
    match (winners.next(), winners.next()) {
        (Some((label, _)), None) => label.to_string(),
        _ => OTHER_LABEL.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use hypogen_agent::{LlmError, MockBackend};
    use hypogen_task::{Example, TaskConfig};

    /// Task with plain templates so mock handlers can match on prompt text.
    pub fn task() -> Arc<Task> {
        let yaml = r#"
task_name: color
train_data_path: unused.json
prompt_templates:
  observations: "${item} -> ${label}"
  example: "${item}"
  batched_generation:
    user: "GENERATE ${num_hypotheses}\n${observations}"
  inference:
    user: "PREDICT\n${hypothesis}\nITEM ${example}"
  is_relevant:
    user: "RELEVANT\n${hypothesis}\nITEM ${example}"
  adaptive_info: "${hypothesis}|${observations}"
  adaptive_inference:
    user: "ADAPTIVE\n${adaptive_info}\nITEM ${example}"
"#;
        let config = TaskConfig::from_yaml(yaml).unwrap();
        Arc::new(Task::from_config(config, ".").unwrap())
    }

    pub fn data(items: &[(&str, &str)]) -> Dataset {
        Dataset::from_examples(
            items
                .iter()
                .map(|(item, label)| Example::new(*label).with_field("item", *item))
                .collect(),
        )
    }

    pub fn context(
        handler: impl Fn(&str) -> std::result::Result<String, LlmError> + Send + Sync + 'static,
        train: Dataset,
    ) -> (InferenceContext, Arc<MockBackend>) {
        let backend = Arc::new(
            MockBackend::default().with_handler(move |request| handler(request.user_text())),
        );
        let client = Arc::new(LlmClient::new(backend.clone()));
        let ctx = InferenceContext {
            client,
            task: task(),
            train: Arc::new(train),
            cache_seed: None,
            max_concurrent: 4,
        };
        (ctx, backend)
    }

    pub fn answer(label: &str) -> std::result::Result<String, LlmError> {
        Ok(format!("Final answer: <begin>{}<end>", label))
    }

    pub fn hyp(h: &str, accuracy: f64, correct: &[usize]) -> SummaryInformation {
        SummaryInformation::new(h)
            .with_stats(accuracy, 10)
            .with_correct_examples(correct.iter().map(|&i| (i, "x".to_string())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_names_round_trip() {
        for style in InferenceStyle::ALL {
            assert_eq!(style.as_str().parse::<InferenceStyle>().unwrap(), style);
        }
        assert!("majority".parse::<InferenceStyle>().is_err());
        assert!(InferenceStyle::TwoStepAdaptive.is_adaptive());
        assert!(!InferenceStyle::Relevance.is_adaptive());
    }

    #[test]
    fn test_weighted_vote() {
        assert_eq!(weighted_vote([("a", 0.9), ("b", 0.5), ("b", 0.5)]), "b");
        assert_eq!(weighted_vote([("a", 0.9), ("b", 0.5), ("b", 0.3)]), "a");
        assert_eq!(weighted_vote([("a", 0.5), ("b", 0.5)]), OTHER_LABEL);
        assert_eq!(weighted_vote([("other", 2.0), ("a", 0.1)]), "a");
        assert_eq!(weighted_vote(Vec::<(&str, f64)>::new()), OTHER_LABEL);
    }
}
