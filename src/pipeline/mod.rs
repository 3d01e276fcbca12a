//! Multi-hop answering pipeline
//!
//! Decomposer → one HopWorker per sub-question → Synthesizer, driven by the
//! [`Orchestrator`] state machine.

pub mod decomposer;
pub mod hop;
pub mod orchestrator;
pub mod prompts;
pub mod state;
pub mod synthesizer;

use crate::errors::{HopError, PipelineError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use decomposer::Decomposer;
pub use hop::HopWorker;
pub use orchestrator::Orchestrator;
pub use state::{PipelineEvent, PipelineState};
pub use synthesizer::{SynthesisInput, Synthesizer};

/// One decomposed sub-question
pub type SubQuestion = String;

/// The caller's original question, trimmed and known to be non-empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question(String);

impl Question {
    pub fn new(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A hop that ended in permanent failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailedHop {
    pub index: usize,
    pub sub_question: SubQuestion,
    pub error: HopError,
}

/// Terminal output of a successful run
#[derive(Debug, Clone)]
pub struct FinalAnswer {
    pub run_id: Uuid,
    pub text: String,
    /// Sub-questions in index order (index = position + 1)
    pub sub_questions: Vec<SubQuestion>,
    /// Hops that failed within the tolerated fraction
    pub failed_hops: Vec<FailedHop>,
}

impl FinalAnswer {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True when every hop contributed a summary
    pub fn is_complete(&self) -> bool {
        self.failed_hops.is_empty()
    }
}

impl std::fmt::Display for FinalAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
