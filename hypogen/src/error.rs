//! Error types for the hypothesis loop.

use std::path::PathBuf;

/// Errors raised by generation, inference and the update loop.
///
/// Recoverable model-side failures (a failed call, an unparsable answer)
/// never surface here; they degrade to an abstention or an empty list.
#[derive(Debug, thiserror::Error)]
pub enum HypogenError {
    /// Relevance judgment said both yes and no
    #[error("Malformed relevance response: {0:?}")]
    MalformedRelevance(String),

    /// Inference request carried no hypotheses
    #[error("Inference request for example {0} has no hypotheses")]
    EmptyHypotheses(usize),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Task loading or dataset access failed
    #[error(transparent)]
    Task(#[from] hypogen_task::TaskError),

    /// Checkpoint file could not be read or written
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias for hypothesis loop operations.
pub type Result<T> = std::result::Result<T, HypogenError>;
