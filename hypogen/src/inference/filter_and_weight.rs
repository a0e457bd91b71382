use async_trait::async_trait;
use hypogen_task::Dataset;
use rand::rngs::StdRng;
use tracing::info;

use super::relevance::relevant_subsets;
use super::{
    labels_for, require_hypotheses, require_nonempty, weighted_vote, FinalOptions, Inference,
    InferenceContext, InferenceStyle, PredictionRequest, Predictions,
};
use crate::bank::HypothesisBank;
use crate::error::Result;

/// Keeps the hypotheses judged relevant to each example, lets each predict
/// on its own, and combines the answers with an accuracy-weighted vote.
///
/// No relevant hypothesis, no usable vote, or a tie gives `"other"`.
pub struct FilterAndWeightInference {
    ctx: InferenceContext,
}

impl FilterAndWeightInference {
    pub fn new(ctx: InferenceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Inference for FilterAndWeightInference {
    fn style(&self) -> InferenceStyle {
        InferenceStyle::FilterAndWeight
    }

    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions> {
        require_hypotheses(requests)?;
        let labels = labels_for(data, requests.iter().map(|r| r.index))?;
        let subsets = relevant_subsets(&self.ctx, data, requests).await?;

        let mut prompts = Vec::new();
        for (request, subset) in requests.iter().zip(&subsets) {
            let example = data.example(request.index)?;
            for summary in subset {
                prompts.push(
                    self.ctx
                        .task
                        .prompts()
                        .inference(&[summary.hypothesis.as_str()], example),
                );
            }
        }
        let mut responses = self.ctx.generate_all(&prompts).await.into_iter();

        let predictions = subsets
            .iter()
            .map(|subset| {
                let votes: Vec<(String, f64)> = subset
                    .iter()
                    .filter_map(|summary| {
                        let response = responses.next().flatten();
                        self.ctx
                            .extract(response.as_deref())
                            .map(|label| (label, summary.accuracy))
                    })
                    .collect();
                Some(weighted_vote(
                    votes.iter().map(|(label, weight)| (label.as_str(), *weight)),
                ))
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
        options: &FinalOptions,
        _rng: &mut StdRng,
    ) -> Result<Predictions> {
        require_nonempty(bank)?;
        let top = bank.top_by_accuracy(options.k);
        info!(k = top.len(), examples = data.len(), "Filter and weight inference");

        let requests: Vec<PredictionRequest> = (0..data.len())
            .map(|i| PredictionRequest::new(i, top.clone()))
            .collect();
        self.batched_predict(data, &requests).await
    }
}
