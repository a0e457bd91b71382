//! Hypothesis generation and initial scoring.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::bank::HypothesisBank;
use crate::error::{HypogenError, Result};
use crate::inference::{Inference, InferenceContext, PredictionRequest};
use crate::summary::SummaryInformation;

fn list_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\d+\.\s").ok()).as_ref()
}

/// Parse a numbered list (`1. ...`, `2. ...`) out of model text.
///
/// Each item runs from its marker to the next marker or the end of the
/// text. Items are trimmed, empty ones dropped, and at most
/// `num_hypotheses` returned.
pub fn extract_hypotheses(text: &str, num_hypotheses: usize) -> Vec<String> {
    let Some(marker) = list_marker() else {
        return Vec::new();
    };

    let bounds: Vec<(usize, usize)> = marker.find_iter(text).map(|m| (m.start(), m.end())).collect();
    bounds
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start))| {
            let body_end = bounds.get(i + 1).map(|&(next, _)| next).unwrap_or(text.len());
            text[body_start..body_end].trim()
        })
        .filter(|item| !item.is_empty())
        .take(num_hypotheses)
        .map(str::to_string)
        .collect()
}

/// Named generation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStyle {
    #[default]
    Default,
}

impl GenerationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStyle::Default => "default",
        }
    }
}

impl fmt::Display for GenerationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStyle {
    type Err = HypogenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(GenerationStyle::Default),
            other => Err(HypogenError::ConfigError(format!(
                "unknown generation style '{}'",
                other
            ))),
        }
    }
}

/// Proposes hypotheses from training examples and scores them.
#[async_trait]
pub trait Generation: Send + Sync {
    /// Strategy style.
    fn style(&self) -> GenerationStyle;

    /// Ask the model for up to `num_hypotheses` hypotheses explaining the
    /// given training examples. A failed call or unparsable answer yields
    /// an empty list.
    async fn batched_hyp_list_generation(
        &self,
        example_indices: &[usize],
        num_hypotheses: usize,
    ) -> Result<Vec<String>>;

    /// Score new hypotheses on the examples that produced them.
    async fn make_hypotheses_bank(
        &self,
        example_indices: &[usize],
        current_sample: usize,
        alpha: f64,
        hypotheses: &[String],
    ) -> Result<HypothesisBank>;

    /// Build the initial bank from the first `num_init` training examples,
    /// one generation call per disjoint batch of `init_batch_size`.
    async fn batched_initialize_hypotheses(
        &self,
        num_init: usize,
        init_batch_size: usize,
        init_hypotheses_per_batch: usize,
        alpha: f64,
    ) -> Result<HypothesisBank> {
        if init_batch_size == 0 || num_init % init_batch_size != 0 {
            return Err(HypogenError::ConfigError(format!(
                "num_init ({}) must be a positive multiple of init_batch_size ({})",
                num_init, init_batch_size
            )));
        }

        let mut bank = HypothesisBank::new();
        for batch in 0..num_init / init_batch_size {
            let indices: Vec<usize> =
                (batch * init_batch_size..(batch + 1) * init_batch_size).collect();
            let hypotheses = self
                .batched_hyp_list_generation(&indices, init_hypotheses_per_batch)
                .await?;
            let fragment = self
                .make_hypotheses_bank(&indices, num_init, alpha, &hypotheses)
                .await?;
            bank = bank.merge(fragment);
        }

        info!(num_init, bank_size = bank.len(), "Initialized hypothesis bank");
        Ok(bank)
    }
}

/// Generates with the task's batched-generation prompt and scores with the
/// configured inference strategy.
pub struct DefaultGeneration {
    ctx: InferenceContext,
    inference: Arc<dyn Inference>,
}

impl DefaultGeneration {
    pub fn new(ctx: InferenceContext, inference: Arc<dyn Inference>) -> Self {
        Self { ctx, inference }
    }
}

#[async_trait]
impl Generation for DefaultGeneration {
    fn style(&self) -> GenerationStyle {
        GenerationStyle::Default
    }

    async fn batched_hyp_list_generation(
        &self,
        example_indices: &[usize],
        num_hypotheses: usize,
    ) -> Result<Vec<String>> {
        let examples = self.ctx.train.select(example_indices)?;
        let prompt = self
            .ctx
            .task
            .prompts()
            .batched_generation(&examples, num_hypotheses);

        let response = match self.ctx.client.generate(&prompt, self.ctx.cache_seed, None).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, batch = example_indices.len(), "Generation call failed");
                return Ok(Vec::new());
            }
        };

        let hypotheses = extract_hypotheses(&response, num_hypotheses);
        if hypotheses.is_empty() {
            warn!(response = %response, "No hypotheses found in generation response");
        } else {
            debug!(count = hypotheses.len(), "Parsed generated hypotheses");
        }
        Ok(hypotheses)
    }

    async fn make_hypotheses_bank(
        &self,
        example_indices: &[usize],
        current_sample: usize,
        alpha: f64,
        hypotheses: &[String],
    ) -> Result<HypothesisBank> {
        let fresh: Vec<SummaryInformation> =
            hypotheses.iter().map(SummaryInformation::new).collect();
        if fresh.is_empty() || example_indices.is_empty() {
            return Ok(HypothesisBank::new());
        }

        let requests: Vec<PredictionRequest> = fresh
            .iter()
            .flat_map(|summary| {
                example_indices
                    .iter()
                    .map(move |&i| PredictionRequest::new(i, vec![summary]))
            })
            .collect();
        let out = self
            .inference
            .batched_predict(&self.ctx.train, &requests)
            .await?;

        let window = example_indices.len();
        let scored = fresh
            .iter()
            .enumerate()
            .map(|(h, summary)| {
                let hits = (0..window)
                    .filter_map(|j| {
                        let k = h * window + j;
                        let label = &out.labels[k];
                        (out.predictions[k].as_deref() == Some(label.as_str()))
                            .then(|| (example_indices[j], label.clone()))
                    })
                    .collect();
                let mut scored = summary.clone();
                scored.record_window(hits, window);
                scored.update_reward(current_sample, alpha);
                scored
            })
            .collect();

        Ok(scored)
    }
}
