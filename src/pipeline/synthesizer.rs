//! Final answer synthesis

use super::{prompts, Question};
use crate::errors::{PipelineError, Result};
use crate::retry::RetryManager;
use crate::services::TextCompletion;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One sub-question paired with its stored summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub index: usize,
    pub sub_question: String,
    pub summary: String,
}

/// Combines hop summaries into the final answer
pub struct Synthesizer {
    completion: Arc<dyn TextCompletion>,
    retry: RetryManager,
}

impl Synthesizer {
    pub fn new(completion: Arc<dyn TextCompletion>, retry: RetryManager) -> Self {
        Self { completion, retry }
    }

    /// Produce the final answer text
    ///
    /// `inputs` must already be in ascending index order. `unanswered` lists
    /// sub-questions whose hops failed within tolerance.
    pub async fn synthesize(
        &self,
        question: &Question,
        inputs: &[SynthesisInput],
        unanswered: &[String],
    ) -> Result<String> {
        let prompt = prompts::synthesis_prompt(question.as_str(), inputs, unanswered);

        let answer = self
            .retry
            .execute("synthesize", || self.completion.complete(&prompt))
            .await
            .map_err(PipelineError::SynthesisFailure)?;

        tracing::info!(
            summaries = inputs.len(),
            unanswered = unanswered.len(),
            "final answer synthesized"
        );
        Ok(answer.trim().to_string())
    }
}
