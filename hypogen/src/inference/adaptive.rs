//! Adaptive inference: pick a small non-redundant subset of the bank first.

use async_trait::async_trait;
use hypogen_agent::Prompt;
use hypogen_task::{Dataset, Example};
use rand::rngs::StdRng;
use tracing::info;

use super::default::DefaultInference;
use super::filter_and_weight::FilterAndWeightInference;
use super::{
    labels_for, require_hypotheses, require_nonempty, FinalOptions, Inference, InferenceContext,
    InferenceStyle, PredictionRequest, Predictions,
};
use crate::bank::HypothesisBank;
use crate::error::Result;
use crate::selection::SelectedHypothesis;

/// Training examples behind `(index, label)` pairs. Indices outside the
/// training set are skipped.
fn supporting_examples<'a>(train: &'a Dataset, examples: &[(usize, String)]) -> Vec<&'a Example> {
    examples.iter().filter_map(|(i, _)| train.get(*i)).collect()
}

/// Supporting examples per hypothesis when predicting inside the update loop.
/// The most recent ones are kept so prompts stay bounded as hypotheses
/// accumulate correct examples.
const LOOP_EXAMPLES_PER_HYPOTHESIS: usize = 5;

fn most_recent(examples: &[(usize, String)]) -> &[(usize, String)] {
    &examples[examples.len().saturating_sub(LOOP_EXAMPLES_PER_HYPOTHESIS)..]
}

/// Adaptive selection needs correct examples to measure overlap.
fn has_no_examples(bank: &HypothesisBank) -> bool {
    bank.iter().all(|s| s.correct_examples.is_empty())
}

/// Selects hypotheses, then predicts each example with one prompt that
/// embeds every selected hypothesis alongside the examples it got right.
pub struct OneStepAdaptiveInference {
    ctx: InferenceContext,
    fallback: DefaultInference,
}

impl OneStepAdaptiveInference {
    pub fn new(ctx: InferenceContext) -> Self {
        Self {
            fallback: DefaultInference::new(ctx.clone()),
            ctx,
        }
    }

    async fn predict_with(
        &self,
        data: &Dataset,
        indices: &[usize],
        selected: &[Vec<(&str, Vec<&Example>)>],
    ) -> Result<Predictions> {
        let prompts = indices
            .iter()
            .zip(selected)
            .map(|(&i, entries)| -> Result<Prompt> {
                let example = data.example(i)?;
                Ok(self.ctx.task.prompts().adaptive_inference(entries, example))
            })
            .collect::<Result<Vec<_>>>()?;
        let labels = labels_for(data, indices.iter().copied())?;

        let responses = self.ctx.generate_all(&prompts).await;
        let predictions = responses
            .iter()
            .map(|r| self.ctx.extract(r.as_deref()))
            .collect();

        Ok(Predictions {
            predictions,
            labels,
        })
    }
}

#[async_trait]
impl Inference for OneStepAdaptiveInference {
    fn style(&self) -> InferenceStyle {
        InferenceStyle::OneStepAdaptive
    }

    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions> {
        require_hypotheses(requests)?;
        let indices: Vec<usize> = requests.iter().map(|r| r.index).collect();
        let selected: Vec<Vec<(&str, Vec<&Example>)>> = requests
            .iter()
            .map(|r| {
                r.hypotheses
                    .iter()
                    .map(|s| {
                        (
                            s.hypothesis.as_str(),
                            supporting_examples(&self.ctx.train, most_recent(&s.correct_examples)),
                        )
                    })
                    .collect()
            })
            .collect();
        self.predict_with(data, &indices, &selected).await
    }

    async fn run_inference_final(
        &self,
        data: &Dataset,
        bank: &HypothesisBank,
        options: &FinalOptions,
        rng: &mut StdRng,
    ) -> Result<Predictions> {
        require_nonempty(bank)?;
        if has_no_examples(bank) {
            info!("No hypothesis has correct examples, using default inference");
            return self
                .fallback
                .run_inference_final(data, bank, options, rng)
                .await;
        }

        let chosen: Vec<SelectedHypothesis> =
            options.selector().select(bank, self.ctx.train.len(), rng)?;
        let entries: Vec<(&str, Vec<&Example>)> = chosen
            .iter()
            .map(|s| {
                (
                    s.hypothesis.as_str(),
                    supporting_examples(&self.ctx.train, &s.examples),
                )
            })
            .collect();
        info!(
            selected = entries.len(),
            examples = data.len(),
            "One-step adaptive inference"
        );

        let indices: Vec<usize> = (0..data.len()).collect();
        let selected = vec![entries; indices.len()];
        self.predict_with(data, &indices, &selected).await
    }
}

/// Selects hypotheses, then runs filter-and-weight over the reduced set.
pub struct TwoStepAdaptiveInference {
    ctx: InferenceContext,
    weighted: FilterAndWeightInference,
    fallback: DefaultInference,
}

impl TwoStepAdaptiveInference {
    pub fn new(ctx: InferenceContext) -> Self {
        Self {
            weighted: FilterAndWeightInference::new(ctx.clone()),
            fallback: DefaultInference::new(ctx.clone()),
            ctx,
        }
    }
}

#[async_trait]
impl Inference for TwoStepAdaptiveInference {
    fn style(&self) -> InferenceStyle {
        InferenceStyle::TwoStepAdaptive
    }

    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions> {
        self.weighted.batched_predict(data, requests).await
    }

    async fn run_inference_final(
        &self,
        data: &Dataset,
        bank: &HypothesisBank,
        options: &FinalOptions,
        rng: &mut StdRng,
    ) -> Result<Predictions> {
        require_nonempty(bank)?;
        if has_no_examples(bank) {
            info!("No hypothesis has correct examples, using default inference");
            return self
                .fallback
                .run_inference_final(data, bank, options, rng)
                .await;
        }

        let chosen = options.selector().select(bank, self.ctx.train.len(), rng)?;
        let names: Vec<&str> = chosen.iter().map(|s| s.hypothesis.as_str()).collect();
        let reduced = bank.subset(&names);
        info!(
            selected = reduced.len(),
            examples = data.len(),
            "Two-step adaptive inference"
        );

        let hypotheses: Vec<_> = reduced.iter().collect();
        let requests: Vec<PredictionRequest> = (0..data.len())
            .map(|i| PredictionRequest::new(i, hypotheses.clone()))
            .collect();
        self.weighted.batched_predict(data, &requests).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use rand::SeedableRng;
    use std::sync::{Arc, Mutex};

    fn train() -> Dataset {
        data(&[("apple", "fruit"), ("pear", "fruit"), ("kale", "veg")])
    }

    fn bank() -> HypothesisBank {
        vec![
            hyp("Sweet things are fruit", 0.9, &[0, 1]),
            hyp("Round things are fruit", 0.5, &[0]),
            hyp("Leaves are veg", 0.7, &[2]),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_one_step_prompt_holds_selected_hypotheses() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let record = seen.clone();
        let (ctx, _) = context(
            move |prompt| {
                record.lock().unwrap().push(prompt.to_string());
                answer("fruit")
            },
            train(),
        );
        let inference = OneStepAdaptiveInference::new(ctx);
        let test = data(&[("plum", "fruit")]);
        let options = FinalOptions {
            adaptive_threshold: 0.5,
            adaptive_num_hypotheses: 3,
            adaptive_num_examples: 5,
            ..FinalOptions::default()
        };

        let out = inference
            .run_inference_final(&test, &bank(), &options, &mut StdRng::seed_from_u64(3))
            .await
            .unwrap();
        assert_eq!(out.predictions, vec![Some("fruit".to_string())]);

        let prompts = seen.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.starts_with("ADAPTIVE"));
        assert!(prompt.contains("Sweet things are fruit|apple -> fruit\n\npear -> fruit"));
        assert!(prompt.contains("Leaves are veg|kale -> veg"));
        // Redundant with the sweeter, more accurate hypothesis.
        assert!(!prompt.contains("Round things"));
        assert!(prompt.ends_with("ITEM plum"));
    }

    #[tokio::test]
    async fn test_loop_prompt_keeps_recent_examples_only() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let record = seen.clone();
        let items = [
            ("a1", "fruit"),
            ("a2", "fruit"),
            ("a3", "fruit"),
            ("a4", "fruit"),
            ("a5", "fruit"),
            ("a6", "fruit"),
            ("a7", "fruit"),
        ];
        let (ctx, _) = context(
            move |prompt| {
                record.lock().unwrap().push(prompt.to_string());
                answer("fruit")
            },
            data(&items),
        );
        let train = ctx.train.clone();
        let inference = OneStepAdaptiveInference::new(ctx);
        let busy = hyp("Everything is fruit", 1.0, &[0, 1, 2, 3, 4, 5, 6]);

        inference
            .batched_predict(&train, &[PredictionRequest::new(0, vec![&busy])])
            .await
            .unwrap();

        let prompts = seen.lock().unwrap();
        assert!(!prompts[0].contains("a2 -> fruit"));
        assert!(prompts[0].contains("a3 -> fruit"));
        assert!(prompts[0].contains("a7 -> fruit"));
    }

    #[tokio::test]
    async fn test_falls_back_without_correct_examples() {
        let (ctx, _) = context(
            |prompt| {
                assert!(prompt.starts_with("PREDICT"));
                answer("veg")
            },
            train(),
        );
        let inference = OneStepAdaptiveInference::new(ctx);
        let test = data(&[("kale", "veg")]);
        let bank: HypothesisBank = vec![hyp("Leaves are veg", 0.7, &[])].into_iter().collect();
        let options = FinalOptions {
            adaptive_num_hypotheses: 5,
            ..FinalOptions::default()
        };

        let out = inference
            .run_inference_final(&test, &bank, &options, &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();
        assert_eq!(out.predictions, vec![Some("veg".to_string())]);
    }

    #[tokio::test]
    async fn test_two_step_votes_over_selection() {
        let (ctx, backend) = context(
            |prompt| {
                if prompt.starts_with("RELEVANT") {
                    return Ok("Final answer: yes".to_string());
                }
                if prompt.contains("Leaves") {
                    answer("veg")
                } else {
                    answer("fruit")
                }
            },
            train(),
        );
        let inference = TwoStepAdaptiveInference::new(ctx);
        let test = data(&[("plum", "fruit")]);
        let options = FinalOptions {
            adaptive_threshold: 0.5,
            adaptive_num_hypotheses: 3,
            ..FinalOptions::default()
        };

        let out = inference
            .run_inference_final(&test, &bank(), &options, &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        // Selected: sweet (0.9, fruit) and leaves (0.7, veg)
        assert_eq!(out.predictions, vec![Some("fruit".to_string())]);
        // 2 relevance + 2 predictions
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_too_many_requested() {
        let (ctx, _) = context(|_| answer("fruit"), train());
        let inference = TwoStepAdaptiveInference::new(ctx);
        let options = FinalOptions {
            adaptive_num_hypotheses: 4,
            ..FinalOptions::default()
        };

        let result = inference
            .run_inference_final(&train(), &bank(), &options, &mut StdRng::seed_from_u64(0))
            .await;
        assert!(matches!(
            result,
            Err(crate::error::HypogenError::ConfigError(_))
        ));
    }
}
