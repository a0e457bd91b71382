//! Run configuration.
//!
//! Loaded from YAML or TOML; every section falls back to its defaults so a
//! config file only needs the values it changes.

use hypogen_agent::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::checkpoint::DEFAULT_FILE_NAME_TEMPLATE;
use crate::error::{HypogenError, Result};
use crate::generation::GenerationStyle;
use crate::inference::{FinalOptions, InferenceStyle};
use crate::selection::SolverKind;
use crate::update::UpdateStyle;

/// Complete configuration of a generation or inference run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Global seed for data sampling and randomized choices
    pub seed: u64,
    /// Response cache seed (`None` disables the cache)
    pub cache_seed: Option<u64>,
    /// Directory for checkpoints
    pub output_dir: PathBuf,
    /// Model access
    pub model: ModelConfig,
    /// Dataset sizes
    pub data: DataConfig,
    /// Initial generation
    pub generation: GenerationConfig,
    /// Update loop
    pub update: UpdateConfig,
    /// Inference
    pub inference: InferenceConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 49,
            cache_seed: None,
            output_dir: PathBuf::from("outputs"),
            model: ModelConfig::default(),
            data: DataConfig::default(),
            generation: GenerationConfig::default(),
            update: UpdateConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse from TOML.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HypogenError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Err(HypogenError::ConfigError(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Reject configurations the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let g = &self.generation;
        if g.init_batch_size == 0 || g.num_init % g.init_batch_size != 0 {
            return Err(HypogenError::ConfigError(format!(
                "num_init ({}) must be a positive multiple of init_batch_size ({})",
                g.num_init, g.init_batch_size
            )));
        }
        if g.num_init > self.data.num_train {
            return Err(HypogenError::ConfigError(format!(
                "num_init ({}) exceeds num_train ({})",
                g.num_init, self.data.num_train
            )));
        }

        let u = &self.update;
        let positive = [
            ("update_batch_size", u.update_batch_size),
            ("max_num_hypotheses", u.max_num_hypotheses),
            ("save_every_n_examples", u.save_every_n_examples),
            ("num_hypotheses_to_update", u.num_hypotheses_to_update),
            ("update_hypotheses_per_batch", u.update_hypotheses_per_batch),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(HypogenError::ConfigError(format!("{} must be positive", name)));
        }
        if !(u.alpha.is_finite() && u.alpha >= 0.0) {
            return Err(HypogenError::ConfigError(format!(
                "alpha must be a non-negative number, got {}",
                u.alpha
            )));
        }
        if !(0.0..=1.0).contains(&u.num_wrong_scale) {
            return Err(HypogenError::ConfigError(format!(
                "num_wrong_scale must be within [0, 1], got {}",
                u.num_wrong_scale
            )));
        }
        if u.epoch_to_start_from > u.num_epochs {
            return Err(HypogenError::ConfigError(format!(
                "epoch_to_start_from ({}) is past num_epochs ({})",
                u.epoch_to_start_from, u.num_epochs
            )));
        }

        if self.model.max_concurrent == 0 {
            return Err(HypogenError::ConfigError(
                "max_concurrent must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any OpenAI-compatible chat completions server (vLLM, OpenAI)
    #[default]
    #[serde(alias = "vllm")]
    Openai,
    /// Scripted responses, for dry runs
    Mock,
}

impl FromStr for BackendKind {
    type Err = HypogenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" | "vllm" => Ok(BackendKind::Openai),
            "mock" => Ok(BackendKind::Mock),
            other => Err(HypogenError::ConfigError(format!("unknown backend '{}'", other))),
        }
    }
}

/// Model access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: BackendKind,
    /// Server base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Environment variable holding the API key, if the server needs one
    pub api_key_env: Option<String>,
    /// Max tokens per completion
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Per-call timeout (ms)
    pub timeout_ms: u64,
    /// In-flight call limit for batched calls
    pub max_concurrent: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            backend: BackendKind::Openai,
            base_url: "http://localhost:8000/v1".to_string(),
            model: "meta-llama/Meta-Llama-3.1-8B-Instruct".to_string(),
            api_key_env: None,
            max_tokens: client.max_tokens,
            temperature: client.temperature,
            timeout_ms: client.timeout_ms,
            max_concurrent: client.max_concurrent,
        }
    }
}

impl ModelConfig {
    /// Client settings for this model.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout_ms: self.timeout_ms,
            max_concurrent: self.max_concurrent,
        }
    }
}

/// Dataset sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub num_train: usize,
    pub num_test: usize,
    pub num_val: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            num_train: 75,
            num_test: 25,
            num_val: 25,
        }
    }
}

/// Initial generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub style: GenerationStyle,
    /// Training examples used to seed the bank
    pub num_init: usize,
    /// Examples per generation prompt
    pub init_batch_size: usize,
    /// Hypotheses requested per generation prompt
    pub init_hypotheses_per_batch: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            style: GenerationStyle::Default,
            num_init: 10,
            init_batch_size: 10,
            init_hypotheses_per_batch: 10,
        }
    }
}

/// Update loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub style: UpdateStyle,
    /// Bank capacity
    pub max_num_hypotheses: usize,
    /// Hypotheses rescored per batch
    pub k: usize,
    /// Exploration weight of the reward
    pub alpha: f64,
    /// Training examples per batch
    pub update_batch_size: usize,
    /// Generation groups triggered by a full hard-example pool
    pub num_hypotheses_to_update: usize,
    /// Hypotheses requested per generation group
    pub update_hypotheses_per_batch: usize,
    /// Keep only the best hypothesis of each generation group
    pub only_best_hypothesis: bool,
    /// Fraction of rescored hypotheses that must be wrong for a hard example
    pub num_wrong_scale: f64,
    /// Checkpoint cadence in training examples
    pub save_every_n_examples: usize,
    pub num_epochs: usize,
    /// Resume offset within `epoch_to_start_from`
    pub sample_num_to_restart_from: Option<usize>,
    pub epoch_to_start_from: usize,
    /// Checkpoint file name template
    pub file_name_template: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            style: UpdateStyle::Default,
            max_num_hypotheses: 20,
            k: 5,
            alpha: 0.5,
            update_batch_size: 10,
            num_hypotheses_to_update: 1,
            update_hypotheses_per_batch: 5,
            only_best_hypothesis: false,
            num_wrong_scale: 0.8,
            save_every_n_examples: 10,
            num_epochs: 1,
            sample_num_to_restart_from: None,
            epoch_to_start_from: 0,
            file_name_template: DEFAULT_FILE_NAME_TEMPLATE.to_string(),
        }
    }
}

/// Inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub style: InferenceStyle,
    /// Hypotheses considered by filtering strategies
    pub k: usize,
    pub adaptive_threshold: f64,
    pub adaptive_num_hypotheses: usize,
    pub adaptive_num_examples: usize,
    pub solver: SolverKind,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let options = FinalOptions::default();
        Self {
            style: InferenceStyle::Default,
            k: options.k,
            adaptive_threshold: options.adaptive_threshold,
            adaptive_num_hypotheses: options.adaptive_num_hypotheses,
            adaptive_num_examples: options.adaptive_num_examples,
            solver: options.solver,
        }
    }
}

impl InferenceConfig {
    /// Options for final inference.
    pub fn final_options(&self) -> FinalOptions {
        FinalOptions {
            k: self.k,
            adaptive_threshold: self.adaptive_threshold,
            adaptive_num_hypotheses: self.adaptive_num_hypotheses,
            adaptive_num_examples: self.adaptive_num_examples,
            solver: self.solver,
        }
    }
}
