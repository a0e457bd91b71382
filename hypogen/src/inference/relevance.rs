use async_trait::async_trait;
use hypogen_agent::Prompt;
use hypogen_task::Dataset;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::{
    labels_for, require_hypotheses, require_nonempty, FinalOptions, Inference, InferenceContext,
    InferenceStyle, PredictionRequest, Predictions,
};
use crate::bank::HypothesisBank;
use crate::error::{HypogenError, Result};
use crate::summary::SummaryInformation;

const ANSWER_MARKER: &str = "Final answer:";

/// Interpret a yes/no relevance judgment.
///
/// After `Final answer:` only the next five characters count, lowercased.
/// A response containing both "yes" and "no" is only accepted when it
/// echoes the question ("yes or no"), which means not relevant; otherwise
/// it is a [`HypogenError::MalformedRelevance`].
pub fn extract_relevance(response: &str) -> Result<bool> {
    let answer = match response.find(ANSWER_MARKER) {
        Some(pos) => response[pos + ANSWER_MARKER.len()..]
            .chars()
            .take(5)
            .collect::<String>()
            .to_lowercase(),
        None => response.to_string(),
    };

    let yes = answer.contains("yes");
    let no = answer.contains("no");
    if yes && no {
        if answer.contains("yes or no") {
            return Ok(false);
        }
        return Err(HypogenError::MalformedRelevance(answer));
    }
    Ok(yes)
}

/// Ask whether each `(example, hypothesis)` pair is relevant.
///
/// A failed call counts as not relevant.
pub(super) async fn judge_relevance(
    ctx: &InferenceContext,
    data: &Dataset,
    pairs: &[(usize, &SummaryInformation)],
) -> Result<Vec<bool>> {
    let prompts = pairs
        .iter()
        .map(|(index, summary)| -> Result<Prompt> {
            let example = data.example(*index)?;
            Ok(ctx.task.prompts().is_relevant(&summary.hypothesis, example))
        })
        .collect::<Result<Vec<_>>>()?;

    let responses = ctx.generate_all(&prompts).await;
    responses
        .iter()
        .zip(pairs)
        .map(|(response, (index, summary))| -> Result<bool> {
            let Some(text) = response else {
                warn!(index, hypothesis = %summary.hypothesis, "Relevance call failed, treating as not relevant");
                return Ok(false);
            };
            let relevant = extract_relevance(text)?;
            debug!(index, hypothesis = %summary.hypothesis, relevant, "Relevance judged");
            Ok(relevant)
        })
        .collect()
}

/// Each request's hypotheses reduced to the relevant ones, request order kept.
pub(super) async fn relevant_subsets<'a>(
    ctx: &InferenceContext,
    data: &Dataset,
    requests: &[PredictionRequest<'a>],
) -> Result<Vec<Vec<&'a SummaryInformation>>> {
    let pairs: Vec<(usize, &'a SummaryInformation)> = requests
        .iter()
        .flat_map(|r| r.hypotheses.iter().map(move |h| (r.index, *h)))
        .collect();
    let flags = judge_relevance(ctx, data, &pairs).await?;

    let mut flags = flags.into_iter();
    Ok(requests
        .iter()
        .map(|r| {
            r.hypotheses
                .iter()
                .copied()
                .filter(|_| flags.next().unwrap_or(false))
                .collect()
        })
        .collect())
}

/// Predicts only with the hypotheses the model judges relevant.
///
/// During the loop a request whose hypotheses are all irrelevant abstains.
/// Final inference falls back to the most accurate hypothesis instead.
pub struct RelevanceInference {
    ctx: InferenceContext,
}

impl RelevanceInference {
    pub fn new(ctx: InferenceContext) -> Self {
        Self { ctx }
    }

    async fn predict_relevant(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
        fallback: Option<&SummaryInformation>,
    ) -> Result<Predictions> {
        require_hypotheses(requests)?;
        let labels = labels_for(data, requests.iter().map(|r| r.index))?;
        let subsets = relevant_subsets(&self.ctx, data, requests).await?;

        let mut prompts = Vec::new();
        let mut slots = Vec::with_capacity(requests.len());
        for (request, subset) in requests.iter().zip(&subsets) {
            let chosen: Vec<&str> = if subset.is_empty() {
                fallback.map(|f| vec![f.hypothesis.as_str()]).unwrap_or_default()
            } else {
                subset.iter().map(|s| s.hypothesis.as_str()).collect()
            };

            if chosen.is_empty() {
                slots.push(None);
            } else {
                let example = data.example(request.index)?;
                slots.push(Some(prompts.len()));
                prompts.push(self.ctx.task.prompts().inference(&chosen, example));
            }
        }

        let responses = self.ctx.generate_all(&prompts).await;
        let predictions = slots
            .into_iter()
            .map(|slot| {
                slot.and_then(|i| self.ctx.extract(responses.get(i).and_then(|r| r.as_deref())))
            })
            .collect();

        Ok(Predictions {
            predictions,
            labels,
        })
    }
}

#[async_trait]
impl Inference for RelevanceInference {
    fn style(&self) -> InferenceStyle {
        InferenceStyle::Relevance
    }

    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions> {
        self.predict_relevant(data, requests, None).await
    }

    async fn run_inference_final(
        &self,
        data: &Dataset,
        bank: &HypothesisBank,
        options: &FinalOptions,
        _rng: &mut StdRng,
    ) -> Result<Predictions> {
        require_nonempty(bank)?;
        let top = bank.top_by_accuracy(options.k);
        let fallback = bank.best_by_accuracy();
        info!(k = top.len(), examples = data.len(), "Relevance inference");

        let requests: Vec<PredictionRequest> = (0..data.len())
            .map(|i| PredictionRequest::new(i, top.clone()))
            .collect();
        self.predict_relevant(data, &requests, fallback).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_extract_relevance() {
        assert!(extract_relevance("Final answer: Yes, it applies").unwrap());
        assert!(!extract_relevance("Final answer: no").unwrap());
        assert!(!extract_relevance("I cannot say").unwrap());
        assert!(!extract_relevance("Answer yes or no please").unwrap());
        assert!(matches!(
            extract_relevance("yes... actually no"),
            Err(HypogenError::MalformedRelevance(_))
        ));
        // Only five characters after the marker are read.
        assert!(!extract_relevance("Final answer: maybe yes").unwrap());
    }

    fn handler(prompt: &str) -> std::result::Result<String, hypogen_agent::LlmError> {
        if prompt.starts_with("RELEVANT") {
            let relevant = prompt.contains("Fruit") && prompt.contains("ITEM apple");
            Ok(format!("Final answer: {}", if relevant { "yes" } else { "no" }))
        } else if prompt.contains("Fruit") {
            answer("fruit")
        } else {
            answer("veg")
        }
    }

    #[tokio::test]
    async fn test_irrelevant_requests_abstain() {
        let (ctx, _) = context(handler, data(&[]));
        let inference = RelevanceInference::new(ctx);
        let test = data(&[("apple", "fruit"), ("kale", "veg")]);
        let h = hyp("Fruit is sweet", 0.8, &[]);

        let out = inference
            .batched_predict(
                &test,
                &[PredictionRequest::new(0, vec![&h]), PredictionRequest::new(1, vec![&h])],
            )
            .await
            .unwrap();

        assert_eq!(out.predictions, vec![Some("fruit".to_string()), None]);
    }

    #[tokio::test]
    async fn test_final_falls_back_to_best() {
        let (ctx, backend) = context(handler, data(&[]));
        let inference = RelevanceInference::new(ctx);
        let test = data(&[("apple", "fruit"), ("kale", "veg")]);
        let bank: HypothesisBank = vec![
            hyp("Leaves are veg", 0.9, &[]),
            hyp("Fruit is sweet", 0.6, &[]),
        ]
        .into_iter()
        .collect();

        let options = FinalOptions {
            k: 2,
            ..FinalOptions::default()
        };
        let out = inference
            .run_inference_final(&test, &bank, &options, &mut StdRng::seed_from_u64(0))
            .await
            .unwrap();

        // apple: only "Fruit is sweet" relevant; kale: none relevant, best is "Leaves are veg"
        assert_eq!(
            out.predictions,
            vec![Some("fruit".to_string()), Some("veg".to_string())]
        );
        // 4 relevance calls + 2 predictions
        assert_eq!(backend.call_count(), 6);
    }

    #[tokio::test]
    async fn test_malformed_relevance_propagates() {
        let (ctx, _) = context(|_| Ok("yes and no".to_string()), data(&[]));
        let inference = RelevanceInference::new(ctx);
        let test = data(&[("apple", "fruit")]);
        let h = hyp("h", 0.5, &[]);

        let result = inference
            .batched_predict(&test, &[PredictionRequest::new(0, vec![&h])])
            .await;
        assert!(matches!(result, Err(HypogenError::MalformedRelevance(_))));
    }
}
