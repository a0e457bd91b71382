//! Hypogen Task - datasets, prompts and label extraction
//!
//! The collaborators the hypothesis loop consumes without owning:
//! - **Dataset**: labeled examples indexable by integer id
//! - **Prompts**: YAML-configured templates rendered into model prompts
//! - **Label extraction**: raw model text to a normalized label
//!
//! A task is described by a YAML file:
//!
//! ```yaml
//! task_name: retweet
//! train_data_path: ./retweet_train.json
//! test_data_path: ./retweet_test.json
//! extract_label: retweet
//! prompt_templates:
//!   observations: "First tweet: ${first_tweet}\nSecond tweet: ${second_tweet}\nAnswer: the ${label} tweet"
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod prompt;
pub mod task;

pub use config::{PromptTemplate, PromptTemplates, TaskConfig};
pub use dataset::{Dataset, Example};
pub use error::{Result, TaskError};
pub use extract::{LabelExtractor, OTHER_LABEL};
pub use prompt::PromptBuilder;
pub use task::{Splits, Task};
