use async_trait::async_trait;
use hypogen_task::Dataset;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use tracing::info;

use super::{
    labels_for, require_hypotheses, require_nonempty, FinalOptions, Inference, InferenceContext,
    InferenceStyle, PredictionRequest, Predictions,
};
use crate::bank::HypothesisBank;
use crate::error::Result;
use crate::summary::SummaryInformation;

/// Optimistic reference strategy.
///
/// Every hypothesis predicts on its own. When predicting the training set,
/// a hypothesis already known to be correct on the example wins (the most
/// accurate such one). Otherwise the majority label wins, and a tied
/// majority defers to the most accurate hypothesis.
pub struct UpperboundInference {
    ctx: InferenceContext,
}

impl UpperboundInference {
    pub fn new(ctx: InferenceContext) -> Self {
        Self { ctx }
    }
}

/// Position of the most accurate entry, earliest on ties.
fn most_accurate(hypotheses: &[&SummaryInformation], among: impl Iterator<Item = usize>) -> Option<usize> {
    among.fold(None, |best: Option<usize>, i| match best {
        Some(b) if hypotheses[b].accuracy >= hypotheses[i].accuracy => Some(b),
        _ => Some(i),
    })
}

/// `train_index` is the example's position in the training set, or `None`
/// for held-out data, where stored correct examples say nothing.
fn combine(
    train_index: Option<usize>,
    hypotheses: &[&SummaryInformation],
    predictions: &[Option<String>],
) -> Option<String> {
    if let Some(index) = train_index {
        let prior = hypotheses
            .iter()
            .enumerate()
            .filter(|(_, h)| h.was_correct_on(index))
            .map(|(i, _)| i);
        if let Some(i) = most_accurate(hypotheses, prior) {
            return predictions[i].clone();
        }
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in predictions.iter().flatten() {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }
    let max = counts.values().copied().max()?;
    let mut leaders = counts.iter().filter(|(_, &c)| c == max);
    match (leaders.next(), leaders.next()) {
        (Some((label, _)), None) => Some(label.to_string()),
        _ => most_accurate(hypotheses, 0..hypotheses.len()).and_then(|i| predictions[i].clone()),
    }
}

#[async_trait]
impl Inference for UpperboundInference {
    fn style(&self) -> InferenceStyle {
        InferenceStyle::Upperbound
    }

    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions> {
        require_hypotheses(requests)?;
        let labels = labels_for(data, requests.iter().map(|r| r.index))?;
        // Correct-example indices point into the training set only.
        let on_train = std::ptr::eq(data, self.ctx.train.as_ref());

        let mut prompts = Vec::new();
        for request in requests {
            let example = data.example(request.index)?;
            for summary in &request.hypotheses {
                prompts.push(
                    self.ctx
                        .task
                        .prompts()
                        .inference(&[summary.hypothesis.as_str()], example),
                );
            }
        }
        let responses = self.ctx.generate_all(&prompts).await;
        let individual: Vec<Option<String>> = responses
            .iter()
            .map(|r| self.ctx.extract(r.as_deref()))
            .collect();

        let mut offset = 0;
        let predictions = requests
            .iter()
            .map(|request| {
                let n = request.hypotheses.len();
                let slice = &individual[offset..offset + n];
                offset += n;
                combine(on_train.then_some(request.index), &request.hypotheses, slice)
            })
            .collect();

        Ok(Predictions {
            predictions,
            labels,
        })
    }

    async fn run_inference_final(
        &self,
        data: &Dataset,
        bank: &HypothesisBank,
        _options: &FinalOptions,
        _rng: &mut StdRng,
    ) -> Result<Predictions> {
        require_nonempty(bank)?;
        let hypotheses: Vec<_> = bank.iter().collect();
        info!(
            hypotheses = hypotheses.len(),
            examples = data.len(),
            "Upperbound inference"
        );

        let requests: Vec<PredictionRequest> = (0..data.len())
            .map(|i| PredictionRequest::new(i, hypotheses.clone()))
            .collect();
        self.batched_predict(data, &requests).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use hypogen_agent::LlmError;
    use rand::SeedableRng;

    fn s(label: &str) -> Option<String> {
        Some(label.to_string())
    }

    #[test]
    fn test_prior_correct_hypothesis_wins() {
        let a = hyp("a", 0.4, &[7]);
        let b = hyp("b", 0.9, &[]);
        let c = hyp("c", 0.6, &[7]);
        let predictions = vec![s("x"), s("y"), s("z")];

        assert_eq!(combine(Some(7), &[&a, &b, &c], &predictions), s("z"));
    }

    #[test]
    fn test_held_out_example_ignores_stored_indices() {
        let a = hyp("a", 0.4, &[7]);
        let b = hyp("b", 0.9, &[]);
        let c = hyp("c", 0.8, &[]);

        assert_eq!(combine(None, &[&a, &b, &c], &[s("x"), s("y"), s("y")]), s("y"));
    }

    #[test]
    fn test_majority_and_tie_break() {
        let a = hyp("a", 0.4, &[]);
        let b = hyp("b", 0.9, &[]);
        let c = hyp("c", 0.6, &[]);

        assert_eq!(combine(Some(0), &[&a, &b, &c], &[s("x"), s("y"), s("x")]), s("x"));
        assert_eq!(combine(Some(0), &[&a, &b], &[s("x"), s("y")]), s("y"));
        assert_eq!(combine(None, &[&a], &[None]), None);
    }

    fn sizes(prompt: &str) -> std::result::Result<String, LlmError> {
        if prompt.contains("Big") || prompt.contains("Heavy") {
            answer("large")
        } else {
            answer("small")
        }
    }

    #[tokio::test]
    async fn test_final_over_held_out_data() {
        let (ctx, backend) = context(sizes, data(&[("ant", "small"), ("bee", "small")]));
        let inference = UpperboundInference::new(ctx);
        let test = data(&[("whale", "large"), ("ant", "small")]);
        let bank: HypothesisBank = vec![
            hyp("Tiny animals", 0.4, &[0]),
            hyp("Big animals", 0.9, &[]),
            hyp("Heavy animals", 0.8, &[]),
        ]
        .into_iter()
        .collect();

        let out = inference
            .run_inference_final(&test, &bank, &FinalOptions::default(), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        // "Tiny animals" was right on training example 0, not on the whale.
        assert_eq!(out.predictions, vec![s("large"), s("large")]);
        assert_eq!(out.labels, vec!["large".to_string(), "small".to_string()]);
        assert_eq!(backend.call_count(), 6);
    }

    #[tokio::test]
    async fn test_training_set_uses_stored_correct_examples() {
        let (ctx, _) = context(sizes, data(&[("ant", "small"), ("whale", "large")]));
        let train = ctx.train.clone();
        let inference = UpperboundInference::new(ctx);
        let tiny = hyp("Tiny animals", 0.4, &[0]);
        let big = hyp("Big animals", 0.9, &[]);
        let heavy = hyp("Heavy animals", 0.8, &[]);
        let requests: Vec<_> = (0..2)
            .map(|i| PredictionRequest::new(i, vec![&tiny, &big, &heavy]))
            .collect();

        let out = inference.batched_predict(&train, &requests).await.unwrap();

        assert_eq!(out.predictions, vec![s("small"), s("large")]);
    }
}
