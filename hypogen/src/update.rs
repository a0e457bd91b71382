//! The update loop: rescore, generate, replace, checkpoint.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bank::HypothesisBank;
use crate::checkpoint::{CheckpointStore, SampleTag};
use crate::config::{GenerationConfig, UpdateConfig};
use crate::error::{HypogenError, Result};
use crate::generation::Generation;
use crate::inference::{Inference, PredictionRequest};
use crate::replace::ReplacePolicy;
use hypogen_task::Dataset;

/// How the hypotheses rescored in each batch are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStyle {
    /// The `k` lowest-reward hypotheses
    #[default]
    Default,
    /// `k` hypotheses drawn with probability proportional to reward
    Sampling,
}

impl UpdateStyle {
    pub const ALL: [UpdateStyle; 2] = [UpdateStyle::Default, UpdateStyle::Sampling];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStyle::Default => "default",
            UpdateStyle::Sampling => "sampling",
        }
    }
}

impl fmt::Display for UpdateStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateStyle {
    type Err = HypogenError;

    fn from_str(s: &str) -> Result<Self> {
        UpdateStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| HypogenError::ConfigError(format!("unknown update style '{}'", s)))
    }
}

/// Chooses which hypotheses to rescore in a batch.
pub trait RefreshPolicy: Send + Sync {
    fn style(&self) -> UpdateStyle;

    /// Up to `k` hypothesis names from `bank`.
    fn choose(&self, bank: &HypothesisBank, k: usize, rng: &mut StdRng) -> Vec<String>;
}

/// Refresh the worst hypotheses. Ties keep bank order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestRewardRefresh;

impl RefreshPolicy for LowestRewardRefresh {
    fn style(&self) -> UpdateStyle {
        UpdateStyle::Default
    }

    fn choose(&self, bank: &HypothesisBank, k: usize, _rng: &mut StdRng) -> Vec<String> {
        bank.lowest_by_reward(k)
    }
}

/// Refresh a reward-weighted random draw without replacement.
///
/// When every reward is zero the draw is uniform.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplingRefresh;

impl RefreshPolicy for SamplingRefresh {
    fn style(&self) -> UpdateStyle {
        UpdateStyle::Sampling
    }

    fn choose(&self, bank: &HypothesisBank, k: usize, rng: &mut StdRng) -> Vec<String> {
        let summaries: Vec<_> = bank.iter().collect();
        let amount = k.min(summaries.len());
        let total: f64 = summaries.iter().map(|s| s.reward.max(0.0)).sum();

        if total > 0.0 && total.is_finite() {
            if let Ok(drawn) =
                summaries.choose_multiple_weighted(rng, amount, |s| s.reward.max(0.0))
            {
                return drawn.map(|s| s.hypothesis.clone()).collect();
            }
            warn!("Reward-weighted draw failed, drawing uniformly");
        }
        summaries
            .choose_multiple(rng, amount)
            .map(|s| s.hypothesis.clone())
            .collect()
    }
}

/// Lifecycle of an [`Updater`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Uninitialized,
    Initialized,
    Updating,
    Done,
}

/// Collaborators of the update loop.
#[derive(Clone)]
pub struct UpdateStrategies {
    pub generation: Arc<dyn Generation>,
    pub inference: Arc<dyn Inference>,
    pub replace: Arc<dyn ReplacePolicy>,
    pub refresh: Arc<dyn RefreshPolicy>,
}

/// Drives initialization and the epoch/batch loop over the training set.
///
/// One RNG, seeded once at construction, backs every random choice of the
/// run.
pub struct Updater {
    strategies: UpdateStrategies,
    store: CheckpointStore,
    train: Arc<Dataset>,
    generation: GenerationConfig,
    config: UpdateConfig,
    rng: StdRng,
    state: UpdateState,
}

impl Updater {
    pub fn new(
        strategies: UpdateStrategies,
        store: CheckpointStore,
        train: Arc<Dataset>,
        generation: GenerationConfig,
        config: UpdateConfig,
        seed: u64,
    ) -> Self {
        Self {
            strategies,
            store,
            train,
            generation,
            config,
            rng: StdRng::seed_from_u64(seed),
            state: UpdateState::Uninitialized,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Build the initial bank and checkpoint it before any update round.
    pub async fn batched_initialize_hypotheses(&mut self, seed: u64) -> Result<HypothesisBank> {
        let g = &self.generation;
        if g.num_init > self.train.len() {
            return Err(HypogenError::ConfigError(format!(
                "num_init ({}) exceeds the training set ({})",
                g.num_init,
                self.train.len()
            )));
        }

        let bank = self
            .strategies
            .generation
            .batched_initialize_hypotheses(
                g.num_init,
                g.init_batch_size,
                g.init_hypotheses_per_batch,
                self.config.alpha,
            )
            .await?;
        self.store
            .save(&bank, SampleTag::At(g.num_init), seed, 0)?;
        self.state = UpdateState::Initialized;
        Ok(bank)
    }

    /// Resume from a checkpoint file.
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<HypothesisBank> {
        let bank = CheckpointStore::load(path)?;
        info!(path = %path.display(), bank_size = bank.len(), "Loaded hypothesis bank");
        self.state = UpdateState::Initialized;
        Ok(bank)
    }

    /// First training index processed in `epoch`.
    fn start_offset(&self, epoch: usize) -> usize {
        match self.config.sample_num_to_restart_from {
            Some(sample) if epoch == self.config.epoch_to_start_from => sample,
            _ if epoch == 0 => self.generation.num_init,
            _ => 0,
        }
    }

    /// Run one epoch over the training set and checkpoint the result.
    pub async fn update(
        &mut self,
        epoch: usize,
        mut bank: HypothesisBank,
        seed: u64,
    ) -> Result<HypothesisBank> {
        match self.state {
            UpdateState::Initialized | UpdateState::Updating => {}
            state => {
                return Err(HypogenError::InvalidState(format!(
                    "cannot update from state {:?}",
                    state
                )))
            }
        }
        self.state = UpdateState::Updating;

        let batch_size = self.config.update_batch_size;
        if batch_size == 0 {
            return Err(HypogenError::ConfigError(
                "update_batch_size must be positive".to_string(),
            ));
        }
        let start = self.start_offset(epoch);
        info!(
            epoch,
            start,
            train = self.train.len(),
            bank_size = bank.len(),
            "Starting update epoch"
        );

        let mut hard_pool: Vec<usize> = Vec::new();
        let mut batch_start = start;
        while batch_start < self.train.len() {
            let batch_end = (batch_start + batch_size).min(self.train.len());
            let batch: Vec<usize> = (batch_start..batch_end).collect();
            let current_sample = batch_end;

            let hard = self.rescore(&mut bank, &batch).await?;
            hard_pool.extend(hard);

            let new_bank = self
                .generate_from_pool(&mut hard_pool, current_sample)
                .await?;

            bank.refresh_rewards(current_sample, self.config.alpha);
            bank = self
                .strategies
                .replace
                .replace(bank, new_bank, self.config.alpha);
            debug!(
                epoch,
                current_sample,
                bank_size = bank.len(),
                pool = hard_pool.len(),
                "Batch done"
            );

            let every = self.config.save_every_n_examples;
            if every > 0 && batch_end / every > batch_start / every {
                self.store
                    .save(&bank, SampleTag::At(current_sample), seed, epoch)?;
            }
            batch_start = batch_end;
        }

        self.store.save(&bank, SampleTag::Final, seed, epoch)?;
        info!(epoch, bank_size = bank.len(), "Finished update epoch");
        Ok(bank)
    }

    /// Rescore the refresh set on `batch`. Returns the hard examples.
    async fn rescore(&mut self, bank: &mut HypothesisBank, batch: &[usize]) -> Result<Vec<usize>> {
        let chosen = self
            .strategies
            .refresh
            .choose(bank, self.config.k, &mut self.rng);
        let threshold = self.config.num_wrong_scale * chosen.len() as f64;

        let mut wrong = vec![0usize; batch.len()];
        if !chosen.is_empty() {
            let summaries: Vec<_> = chosen.iter().filter_map(|h| bank.get(h)).collect();
            let requests: Vec<PredictionRequest> = summaries
                .iter()
                .flat_map(|s| batch.iter().map(move |&i| PredictionRequest::new(i, vec![*s])))
                .collect();
            let out = self
                .strategies
                .inference
                .batched_predict(&self.train, &requests)
                .await?;

            let window = batch.len();
            let mut updates = Vec::with_capacity(summaries.len());
            for (h, summary) in summaries.iter().enumerate() {
                let mut hits = Vec::new();
                for (j, &index) in batch.iter().enumerate() {
                    let k = h * window + j;
                    let label = &out.labels[k];
                    if out.predictions[k].as_deref() == Some(label.as_str()) {
                        hits.push((index, label.clone()));
                    } else {
                        wrong[j] += 1;
                    }
                }
                updates.push((summary.hypothesis.clone(), hits));
            }

            for (hypothesis, hits) in updates {
                if let Some(summary) = bank.get_mut(&hypothesis) {
                    summary.record_window(hits, window);
                }
            }
        }

        let hard: Vec<usize> = batch
            .iter()
            .zip(&wrong)
            .filter(|(_, &w)| w as f64 >= threshold)
            .map(|(&i, _)| i)
            .collect();
        debug!(
            rescored = chosen.len(),
            hard = hard.len(),
            "Rescored refresh set"
        );
        Ok(hard)
    }

    /// Generate from the hard-example pool once it is full.
    async fn generate_from_pool(
        &mut self,
        pool: &mut Vec<usize>,
        current_sample: usize,
    ) -> Result<HypothesisBank> {
        let group = self.config.update_batch_size;
        let groups = self.config.num_hypotheses_to_update;
        let mut new_bank = HypothesisBank::new();
        if groups == 0 || pool.len() < group * groups {
            return Ok(new_bank);
        }

        let drained: Vec<usize> = pool.drain(..group * groups).collect();
        for indices in drained.chunks(group) {
            let hypotheses = self
                .strategies
                .generation
                .batched_hyp_list_generation(indices, self.config.update_hypotheses_per_batch)
                .await?;
            let mut fragment = self
                .strategies
                .generation
                .make_hypotheses_bank(indices, current_sample, self.config.alpha, &hypotheses)
                .await?;
            if self.config.only_best_hypothesis {
                fragment = fragment.top_by_reward(1);
            }
            new_bank = new_bank.merge(fragment);
        }

        info!(
            current_sample,
            groups,
            generated = new_bank.len(),
            "Generated hypotheses from hard examples"
        );
        Ok(new_bank)
    }

    /// Initialize (or take `initial`) and run every configured epoch.
    pub async fn run(&mut self, seed: u64, initial: Option<HypothesisBank>) -> Result<HypothesisBank> {
        let mut bank = match initial {
            Some(bank) => {
                self.state = UpdateState::Initialized;
                bank
            }
            None => self.batched_initialize_hypotheses(seed).await?,
        };

        for epoch in self.config.epoch_to_start_from..self.config.num_epochs {
            bank = self.update(epoch, bank, seed).await?;
        }

        self.state = UpdateState::Done;
        info!(seed, bank_size = bank.len(), "Hypothesis generation done");
        Ok(bank)
    }

    /// Path of the final checkpoint of an epoch.
    pub fn final_checkpoint_path(&self, seed: u64, epoch: usize) -> PathBuf {
        self.store.path_for(SampleTag::Final, seed, epoch)
    }
}
