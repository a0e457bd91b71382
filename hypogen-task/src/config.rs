//! Task configuration loaded from YAML.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a hypothesis discovery task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name
    pub task_name: String,
    /// Name of the label column
    #[serde(default = "default_label_name")]
    pub label_name: String,
    /// Training data (relative paths resolve against the config file)
    pub train_data_path: PathBuf,
    /// Test data
    #[serde(default)]
    pub test_data_path: Option<PathBuf>,
    /// Validation data
    #[serde(default)]
    pub val_data_path: Option<PathBuf>,
    /// Label extractor name (`default`, `retweet`, ... or `regex:<pattern>`)
    #[serde(default = "default_extractor")]
    pub extract_label: String,
    /// Prompt templates
    #[serde(default)]
    pub prompt_templates: PromptTemplates,
}

fn default_label_name() -> String {
    "label".to_string()
}

fn default_extractor() -> String {
    "default".to_string()
}

impl TaskConfig {
    /// Parse from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// A system/user template pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System message template
    #[serde(default)]
    pub system: Option<String>,
    /// User message template
    pub user: String,
}

impl PromptTemplate {
    fn new(system: &str, user: &str) -> Self {
        Self {
            system: Some(system.to_string()),
            user: user.to_string(),
        }
    }
}

/// Templates used to talk to the model.
///
/// Placeholders use `${name}`. Every example field is available by name,
/// plus `${fields}` (all fields as `name: value` lines) and `${label}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// One labeled example inside a prompt
    pub observations: String,
    /// One unlabeled example to predict
    pub example: String,
    /// Propose `${num_hypotheses}` hypotheses from `${observations}`
    pub batched_generation: PromptTemplate,
    /// Predict with `${hypothesis}`
    pub inference: PromptTemplate,
    /// Judge whether `${hypothesis}` applies
    pub is_relevant: PromptTemplate,
    /// One selected hypothesis with its supporting `${observations}`
    pub adaptive_info: String,
    /// Predict from `${adaptive_info}`
    pub adaptive_inference: PromptTemplate,
}

const SCIENTIST: &str = "You are a careful scientist who explains labeled data with hypotheses.";

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            observations: "${fields}\nLabel: ${label}".to_string(),
            example: "${fields}".to_string(),
            batched_generation: PromptTemplate::new(
                SCIENTIST,
                "We have the following labeled observations:\n\n${observations}\n\n\
                 Propose ${num_hypotheses} hypotheses that explain what determines the label. \
                 Answer with a numbered list in the format:\n\
                 1. [hypothesis]\n2. [hypothesis]\n...",
            ),
            inference: PromptTemplate::new(
                SCIENTIST,
                "Hypothesis: ${hypothesis}\n\nObservation:\n${example}\n\n\
                 Using the hypothesis, predict the label of the observation. \
                 Give your final answer in the format: Final answer: <begin>label<end>",
            ),
            is_relevant: PromptTemplate::new(
                SCIENTIST,
                "Hypothesis: ${hypothesis}\n\nObservation:\n${example}\n\n\
                 Does the hypothesis apply to this observation? Answer yes or no.\n\
                 Give your answer in the format: Final answer: yes/no",
            ),
            adaptive_info: "Pattern ${index}: ${hypothesis}\n${observations}".to_string(),
            adaptive_inference: PromptTemplate::new(
                SCIENTIST,
                "Patterns learned from earlier observations, each with supporting examples:\n\n\
                 ${adaptive_info}\n\nObservation:\n${example}\n\n\
                 Choose the pattern that best applies and predict the label. \
                 Give your final answer in the format: Final answer: <begin>label<end>",
            ),
        }
    }
}
