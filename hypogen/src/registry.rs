//! Name to implementation resolution for the strategy families.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{HypogenError, Result};
use crate::generation::{DefaultGeneration, Generation, GenerationStyle};
use crate::inference::{
    DefaultInference, FilterAndWeightInference, Inference, InferenceContext, InferenceStyle,
    OneStepAdaptiveInference, RelevanceInference, TwoStepAdaptiveInference, UpperboundInference,
};
use crate::replace::{DefaultReplace, ReplacePolicy};
use crate::update::{LowestRewardRefresh, RefreshPolicy, SamplingRefresh, UpdateStrategies, UpdateStyle};

/// Strategies available to a run, keyed by style.
///
/// Built once at startup and passed by reference to whatever needs to
/// resolve a configured style.
#[derive(Default, Clone)]
pub struct StrategyMap {
    inference: HashMap<InferenceStyle, Arc<dyn Inference>>,
    generation: HashMap<GenerationStyle, Arc<dyn Generation>>,
    refresh: HashMap<UpdateStyle, Arc<dyn RefreshPolicy>>,
}

impl StrategyMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in strategy. Generation scores new hypotheses with
    /// `scoring`.
    pub fn with_builtins(ctx: InferenceContext, scoring: InferenceStyle) -> Self {
        let mut map = Self::new();
        map.register_inference(Arc::new(DefaultInference::new(ctx.clone())));
        map.register_inference(Arc::new(FilterAndWeightInference::new(ctx.clone())));
        map.register_inference(Arc::new(RelevanceInference::new(ctx.clone())));
        map.register_inference(Arc::new(OneStepAdaptiveInference::new(ctx.clone())));
        map.register_inference(Arc::new(TwoStepAdaptiveInference::new(ctx.clone())));
        map.register_inference(Arc::new(UpperboundInference::new(ctx.clone())));

        let scorer = map
            .inference
            .get(&scoring)
            .cloned()
            .unwrap_or_else(|| Arc::new(DefaultInference::new(ctx.clone())));
        map.register_generation(Arc::new(DefaultGeneration::new(ctx, scorer)));

        map.register_refresh(Arc::new(LowestRewardRefresh));
        map.register_refresh(Arc::new(SamplingRefresh));
        map
    }

    /// Add or replace an inference strategy under its own style.
    pub fn register_inference(&mut self, strategy: Arc<dyn Inference>) {
        debug!(style = %strategy.style(), "Registered inference strategy");
        self.inference.insert(strategy.style(), strategy);
    }

    /// Add or replace a generation strategy under its own style.
    pub fn register_generation(&mut self, strategy: Arc<dyn Generation>) {
        self.generation.insert(strategy.style(), strategy);
    }

    /// Add or replace a refresh policy under its own style.
    pub fn register_refresh(&mut self, policy: Arc<dyn RefreshPolicy>) {
        self.refresh.insert(policy.style(), policy);
    }

    pub fn inference(&self, style: InferenceStyle) -> Result<Arc<dyn Inference>> {
        self.inference.get(&style).cloned().ok_or_else(|| {
            HypogenError::ConfigError(format!("inference style '{}' is not registered", style))
        })
    }

    pub fn generation(&self, style: GenerationStyle) -> Result<Arc<dyn Generation>> {
        self.generation.get(&style).cloned().ok_or_else(|| {
            HypogenError::ConfigError(format!("generation style '{}' is not registered", style))
        })
    }

    pub fn refresh(&self, style: UpdateStyle) -> Result<Arc<dyn RefreshPolicy>> {
        self.refresh.get(&style).cloned().ok_or_else(|| {
            HypogenError::ConfigError(format!("update style '{}' is not registered", style))
        })
    }

    /// Collaborators for the update loop.
    pub fn update_strategies(
        &self,
        generation: GenerationStyle,
        inference: InferenceStyle,
        update: UpdateStyle,
        max_num_hypotheses: usize,
    ) -> Result<UpdateStrategies> {
        let replace: Arc<dyn ReplacePolicy> = Arc::new(DefaultReplace::new(max_num_hypotheses));
        Ok(UpdateStrategies {
            generation: self.generation(generation)?,
            inference: self.inference(inference)?,
            replace,
            refresh: self.refresh(update)?,
        })
    }
}
