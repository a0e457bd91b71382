//! Subcommand execution.

use anyhow::{bail, Context};
use hypogen::{
    BackendKind, CheckpointStore, EvalMetrics, InferenceContext, ModelConfig, RunConfig,
    StrategyMap, Updater,
};
use hypogen_agent::{LlmBackend, LlmClient, MockBackend, OpenAiBackend};
use hypogen_task::{Dataset, Task};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::{GenerateArgs, InferArgs};

/// Load the config file, or defaults when none is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    match path {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            info!("No config file given, using defaults");
            Ok(RunConfig::default())
        }
    }
}

/// Model backend for the configured kind.
pub fn build_backend(model: &ModelConfig) -> anyhow::Result<Arc<dyn LlmBackend>> {
    match model.backend {
        BackendKind::Openai => {
            let api_key = match &model.api_key_env {
                Some(var) => match std::env::var(var) {
                    Ok(key) => Some(key),
                    Err(_) => {
                        warn!(var = %var, "API key variable is not set");
                        None
                    }
                },
                None => None,
            };
            let backend = OpenAiBackend::new(&model.base_url, &model.model, api_key)
                .context("creating model backend")?;
            Ok(Arc::new(backend))
        }
        BackendKind::Mock => {
            warn!("Using the mock backend, every response is empty");
            Ok(Arc::new(MockBackend::new(&model.model).with_response("")))
        }
    }
}

/// Fail fast when the model server does not answer.
pub async fn ensure_available(client: &LlmClient) -> anyhow::Result<()> {
    if !client.is_available().await {
        bail!("model backend '{}' is not reachable", client.model_id());
    }
    Ok(())
}

fn context(config: &RunConfig, task: Arc<Task>, train: Dataset) -> anyhow::Result<InferenceContext> {
    let backend = build_backend(&config.model)?;
    let client = LlmClient::new(backend).with_config(config.model.client_config());
    Ok(InferenceContext {
        client: Arc::new(client),
        task,
        train: Arc::new(train),
        cache_seed: config.cache_seed,
        max_concurrent: config.model.max_concurrent,
    })
}

fn load_task(path: &Path) -> anyhow::Result<Arc<Task>> {
    let task = Task::from_yaml_file(path)
        .with_context(|| format!("loading task {}", path.display()))?;
    Ok(Arc::new(task))
}

/// Build or resume a bank and run every configured epoch.
///
/// Returns the final checkpoint of the last epoch.
pub async fn generate(mut config: RunConfig, args: &GenerateArgs) -> anyhow::Result<PathBuf> {
    args.apply(&mut config);
    config.validate()?;

    let task = load_task(&args.data.task_config)?;
    let d = &config.data;
    let splits = task.get_data(d.num_train, d.num_test, d.num_val, config.seed)?;
    let ctx = context(&config, task, splits.train)?;
    ensure_available(&ctx.client).await?;
    info!(
        task = ctx.task.name(),
        model = ctx.client.model_id(),
        train = ctx.train.len(),
        "Starting hypothesis generation"
    );

    let strategies = StrategyMap::with_builtins(ctx.clone(), config.inference.style);
    let store = CheckpointStore::new(&config.output_dir)
        .with_template(config.update.file_name_template.clone());
    let mut updater = Updater::new(
        strategies.update_strategies(
            config.generation.style,
            config.inference.style,
            config.update.style,
            config.update.max_num_hypotheses,
        )?,
        store,
        ctx.train.clone(),
        config.generation.clone(),
        config.update.clone(),
        config.seed,
    );

    let initial = match &args.old_hypothesis_file {
        Some(path) => Some(updater.load_checkpoint(path)?),
        None => None,
    };
    let bank = updater.run(config.seed, initial).await?;

    let last_epoch = config.update.num_epochs.saturating_sub(1);
    let path = updater.final_checkpoint_path(config.seed, last_epoch);
    info!(bank_size = bank.len(), path = %path.display(), "Generation finished");
    Ok(path)
}

/// Metrics of one seed.
#[derive(Debug, Clone)]
pub struct SeedResult {
    pub seed: u64,
    pub metrics: EvalMetrics,
}

/// Mean accuracy and F1 over seeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedAverage {
    pub accuracy: f64,
    pub macro_f1: f64,
}

/// `None` for an empty slice.
pub fn average(results: &[SeedResult]) -> Option<SeedAverage> {
    if results.is_empty() {
        return None;
    }
    let n = results.len() as f64;
    Some(SeedAverage {
        accuracy: results.iter().map(|r| r.metrics.accuracy).sum::<f64>() / n,
        macro_f1: results.iter().map(|r| r.metrics.macro_f1).sum::<f64>() / n,
    })
}

/// Run final inference once per seed.
pub async fn infer(mut config: RunConfig, args: &InferArgs) -> anyhow::Result<Vec<SeedResult>> {
    args.apply(&mut config);
    config.validate()?;
    if args.seeds.is_empty() {
        bail!("at least one seed is required");
    }

    let task = load_task(&args.data.task_config)?;
    let bank = CheckpointStore::load(&args.hypothesis_file)
        .with_context(|| format!("loading hypotheses {}", args.hypothesis_file.display()))?;
    let options = config.inference.final_options();

    let mut results = Vec::with_capacity(args.seeds.len());
    for &seed in &args.seeds {
        let d = &config.data;
        let splits = task.get_data(d.num_train, d.num_test, d.num_val, seed)?;
        let data = if args.use_valid { splits.val } else { splits.test };
        let ctx = context(&config, task.clone(), splits.train)?;
        if results.is_empty() {
            ensure_available(&ctx.client).await?;
        }

        let strategies = StrategyMap::with_builtins(ctx, config.inference.style);
        let inference = strategies.inference(config.inference.style)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let out = inference
            .run_inference_final(&data, &bank, &options, &mut rng)
            .await?;

        let metrics = EvalMetrics::compute(&out.predictions, &out.labels);
        info!(
            seed,
            style = %config.inference.style,
            examples = data.len(),
            accuracy = metrics.accuracy,
            f1 = metrics.macro_f1,
            "Inference finished"
        );
        results.push(SeedResult { seed, metrics });
    }

    if let Some(mean) = average(&results) {
        info!(
            seeds = results.len(),
            accuracy = mean.accuracy,
            f1 = mean.macro_f1,
            "Averaged over seeds"
        );
    }
    Ok(results)
}
