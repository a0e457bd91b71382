//! Error types for task loading.

use std::path::PathBuf;

/// Errors raised while loading tasks and datasets.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dataset file has the wrong shape
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Example index outside the dataset
    #[error("Example index {index} out of range for dataset of {len} examples")]
    IndexOutOfRange { index: usize, len: usize },

    /// No extractor with this name
    #[error("Unknown label extractor: {0}")]
    UnknownExtractor(String),

    /// Invalid regular expression
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result alias for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;
