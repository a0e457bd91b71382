use async_trait::async_trait;
use hypogen_agent::Prompt;
use hypogen_task::Dataset;
use rand::rngs::StdRng;
use tracing::info;

use super::{
    labels_for, require_hypotheses, require_nonempty, FinalOptions, Inference, InferenceContext,
    InferenceStyle, PredictionRequest, Predictions,
};
use crate::bank::HypothesisBank;
use crate::error::Result;

/// Predicts by embedding the request's hypotheses in a single prompt.
pub struct DefaultInference {
    ctx: InferenceContext,
}

impl DefaultInference {
    pub fn new(ctx: InferenceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Inference for DefaultInference {
    fn style(&self) -> InferenceStyle {
        InferenceStyle::Default
    }

    async fn batched_predict(
        &self,
        data: &Dataset,
        requests: &[PredictionRequest<'_>],
    ) -> Result<Predictions> {
        require_hypotheses(requests)?;

        let prompts = requests
            .iter()
            .map(|r| -> Result<Prompt> {
                let example = data.example(r.index)?;
                Ok(self.ctx.task.prompts().inference(&r.texts(), example))
            })
            .collect::<Result<Vec<_>>>()?;
        let labels = labels_for(data, requests.iter().map(|r| r.index))?;

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

    async fn run_inference_final(
        &self,
        data: &Dataset,
        bank: &HypothesisBank,
        _options: &FinalOptions,
        _rng: &mut StdRng,
    ) -> Result<Predictions> {
        require_nonempty(bank)?;
        let best = bank.top_by_accuracy(1);
        for summary in &best {
            info!(
                hypothesis = %summary.hypothesis,
                accuracy = summary.accuracy,
                examples = data.len(),
                "Default inference with the most accurate hypothesis"
            );
        }

        let requests: Vec<PredictionRequest> = (0..data.len())
            .map(|i| PredictionRequest::new(i, best.clone()))
            .collect();
        self.batched_predict(data, &requests).await
    }
}
