//! Command-line arguments.
//!
//! Every flag is optional and overrides the matching config file value.

use clap::{Args, Parser, Subcommand};
use hypogen::{
    BackendKind, GenerationStyle, InferenceStyle, RunConfig, SolverKind, UpdateStyle,
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hypogen")]
#[command(about = "Generate hypotheses from labeled examples and predict with them")]
pub struct Cli {
    /// Run configuration (.toml or .yaml)
    #[arg(short, long, global = true, env = "HYPOGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a hypothesis bank and run the update loop
    Generate(GenerateArgs),

    /// Predict with a saved hypothesis bank and report accuracy
    Infer(InferArgs),
}

/// Model access flags.
#[derive(Debug, Clone, Default, Args)]
pub struct ModelArgs {
    /// Backend (openai, vllm or mock)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Server base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[arg(long)]
    pub api_key_env: Option<String>,

    /// Response cache seed
    #[arg(long)]
    pub cache_seed: Option<u64>,

    /// In-flight call limit
    #[arg(long)]
    pub max_concurrent: Option<usize>,
}

/// Dataset flags.
#[derive(Debug, Clone, Default, Args)]
pub struct DataArgs {
    /// Task config (YAML)
    #[arg(long)]
    pub task_config: PathBuf,

    #[arg(long)]
    pub num_train: Option<usize>,

    #[arg(long)]
    pub num_test: Option<usize>,

    #[arg(long)]
    pub num_val: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Checkpoint directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Resume from this bank instead of initializing
    #[arg(long)]
    pub old_hypothesis_file: Option<PathBuf>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub generation_style: Option<GenerationStyle>,

    /// Strategy scoring hypotheses during updates
    #[arg(long)]
    pub inference_style: Option<InferenceStyle>,

    #[arg(long)]
    pub update_style: Option<UpdateStyle>,

    #[arg(long)]
    pub num_init: Option<usize>,

    #[arg(long)]
    pub init_batch_size: Option<usize>,

    #[arg(long)]
    pub init_hypotheses_per_batch: Option<usize>,

    /// Bank capacity
    #[arg(long)]
    pub max_num_hypotheses: Option<usize>,

    /// Hypotheses rescored per batch
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Exploration weight
    #[arg(long)]
    pub alpha: Option<f64>,

    #[arg(long)]
    pub update_batch_size: Option<usize>,

    #[arg(long)]
    pub num_hypotheses_to_update: Option<usize>,

    #[arg(long)]
    pub update_hypotheses_per_batch: Option<usize>,

    /// Keep only the best hypothesis of each generation round
    #[arg(long)]
    pub only_best_hypothesis: bool,

    #[arg(long)]
    pub num_wrong_scale: Option<f64>,

    #[arg(long)]
    pub save_every_n_examples: Option<usize>,

    #[arg(long)]
    pub num_epochs: Option<usize>,

    #[arg(long)]
    pub sample_num_to_restart_from: Option<usize>,

    #[arg(long)]
    pub epoch_to_start_from: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct InferArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Saved hypothesis bank
    #[arg(long)]
    pub hypothesis_file: PathBuf,

    /// Evaluate once per seed
    #[arg(long, value_delimiter = ',', default_value = "49")]
    pub seeds: Vec<u64>,

    /// Evaluate on the validation split instead of the test split
    #[arg(long)]
    pub use_valid: bool,

    #[arg(long)]
    pub inference_style: Option<InferenceStyle>,

    /// Hypotheses considered by filtering strategies
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    #[arg(long)]
    pub adaptive_threshold: Option<f64>,

    #[arg(long)]
    pub adaptive_num_hypotheses: Option<usize>,

    #[arg(long)]
    pub adaptive_num_examples: Option<usize>,

    #[arg(long)]
    pub solver: Option<SolverKind>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl ModelArgs {
    pub fn apply(&self, config: &mut RunConfig) {
        let m = &mut config.model;
        set(&mut m.backend, self.backend);
        set(&mut m.model, self.model.clone());
        set(&mut m.base_url, self.base_url.clone());
        if self.api_key_env.is_some() {
            m.api_key_env = self.api_key_env.clone();
        }
        set(&mut m.max_concurrent, self.max_concurrent);
        if self.cache_seed.is_some() {
            config.cache_seed = self.cache_seed;
        }
    }
}

impl DataArgs {
    pub fn apply(&self, config: &mut RunConfig) {
        set(&mut config.data.num_train, self.num_train);
        set(&mut config.data.num_test, self.num_test);
        set(&mut config.data.num_val, self.num_val);
    }
}

impl GenerateArgs {
    /// Overlay these flags on `config`.
    pub fn apply(&self, config: &mut RunConfig) {
        self.data.apply(config);
        self.model.apply(config);
        set(&mut config.output_dir, self.output_dir.clone());
        set(&mut config.seed, self.seed);
        set(&mut config.inference.style, self.inference_style);

        let g = &mut config.generation;
        set(&mut g.style, self.generation_style);
        set(&mut g.num_init, self.num_init);
        set(&mut g.init_batch_size, self.init_batch_size);
        set(&mut g.init_hypotheses_per_batch, self.init_hypotheses_per_batch);

        let u = &mut config.update;
        set(&mut u.style, self.update_style);
        set(&mut u.max_num_hypotheses, self.max_num_hypotheses);
        set(&mut u.k, self.k);
        set(&mut u.alpha, self.alpha);
        set(&mut u.update_batch_size, self.update_batch_size);
        set(&mut u.num_hypotheses_to_update, self.num_hypotheses_to_update);
        set(&mut u.update_hypotheses_per_batch, self.update_hypotheses_per_batch);
        u.only_best_hypothesis |= self.only_best_hypothesis;
        set(&mut u.num_wrong_scale, self.num_wrong_scale);
        set(&mut u.save_every_n_examples, self.save_every_n_examples);
        set(&mut u.num_epochs, self.num_epochs);
        if self.sample_num_to_restart_from.is_some() {
            u.sample_num_to_restart_from = self.sample_num_to_restart_from;
        }
        set(&mut u.epoch_to_start_from, self.epoch_to_start_from);
    }
}

impl InferArgs {
    /// Overlay these flags on `config`.
    pub fn apply(&self, config: &mut RunConfig) {
        self.data.apply(config);
        self.model.apply(config);

        let i = &mut config.inference;
        set(&mut i.style, self.inference_style);
        set(&mut i.k, self.k);
        set(&mut i.adaptive_threshold, self.adaptive_threshold);
        set(&mut i.adaptive_num_hypotheses, self.adaptive_num_hypotheses);
        set(&mut i.adaptive_num_examples, self.adaptive_num_examples);
        set(&mut i.solver, self.solver);
    }
}
