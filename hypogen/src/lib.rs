//! Hypogen - iterative hypothesis discovery
//!
//! Grows a bounded bank of natural-language hypotheses from labeled
//! examples and uses the bank to predict labels:
//!
//! - **Generation**: ask the model for hypotheses explaining a batch of examples
//! - **Update**: rescore, replace and checkpoint as training examples stream by
//! - **Inference**: turn hypotheses into predictions, six strategies
//! - **Selection**: exact 0/1 choice of a non-redundant, accurate subset
//!
//! Hypotheses are ranked by an upper-confidence reward, accuracy plus an
//! exploration bonus that shrinks as evidence accumulates.
//!
//! # Example
//!
//! ```ignore
//! use hypogen::{CheckpointStore, InferenceContext, RunConfig, StrategyMap, Updater};
//!
//! let config = RunConfig::from_file(Path::new("run.toml"))?;
//! let strategies = StrategyMap::with_builtins(ctx, config.inference.style);
//! let mut updater = Updater::new(
//!     strategies.update_strategies(
//!         config.generation.style,
//!         config.inference.style,
//!         config.update.style,
//!         config.update.max_num_hypotheses,
//!     )?,
//!     CheckpointStore::new(&config.output_dir),
//!     train,
//!     config.generation.clone(),
//!     config.update.clone(),
//!     config.seed,
//! );
//! let bank = updater.run(config.seed, None).await?;
//! ```

pub mod bank;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod generation;
pub mod inference;
pub mod metrics;
pub mod registry;
pub mod replace;
pub mod selection;
pub mod summary;
pub mod update;

pub use bank::HypothesisBank;
pub use checkpoint::{CheckpointStore, SampleTag, DEFAULT_FILE_NAME_TEMPLATE};
pub use config::{
    BackendKind, DataConfig, GenerationConfig, InferenceConfig, ModelConfig, RunConfig,
    UpdateConfig,
};
pub use error::{HypogenError, Result};
pub use generation::{extract_hypotheses, DefaultGeneration, Generation, GenerationStyle};
pub use inference::{
    FinalOptions, Inference, InferenceContext, InferenceStyle, PredictionRequest, Predictions,
};
pub use metrics::EvalMetrics;
pub use registry::StrategyMap;
pub use replace::{DefaultReplace, ReplacePolicy};
pub use selection::{AdaptiveSelector, SelectedHypothesis, SelectionSolver, SolverKind};
pub use summary::{reward_for, SummaryInformation};
pub use update::{
    LowestRewardRefresh, RefreshPolicy, SamplingRefresh, UpdateState, UpdateStrategies,
    UpdateStyle, Updater,
};
