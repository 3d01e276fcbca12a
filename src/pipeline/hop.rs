//! Hop worker
//!
//! A hop answers one sub-question: retrieve fragments, summarize them, and
//! persist the summary under the hop's index. Hops share nothing but the
//! artifact store, so any number may run at once.

use super::prompts::{self, FRAGMENT_SEPARATOR, NO_EVIDENCE_MARKER};
use crate::artifacts::{Artifact, ArtifactStore};
use crate::errors::HopError;
use crate::retry::RetryManager;
use crate::services::{Retriever, TextCompletion};
use std::sync::Arc;

/// Default number of fragments retrieved per hop
pub const DEFAULT_TOP_K: usize = 5;

/// Executes hops against shared services
#[derive(Clone)]
pub struct HopWorker {
    retriever: Arc<dyn Retriever>,
    completion: Arc<dyn TextCompletion>,
    store: Arc<dyn ArtifactStore>,
    retry: RetryManager,
    top_k: usize,
}

impl HopWorker {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        completion: Arc<dyn TextCompletion>,
        store: Arc<dyn ArtifactStore>,
        retry: RetryManager,
    ) -> Self {
        Self {
            retriever,
            completion,
            store,
            retry,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Run one hop to completion and persist its summary
    ///
    /// Re-running an index overwrites the previous summary.
    pub async fn run_hop(&self, index: usize, sub_question: &str) -> Result<Artifact, HopError> {
        let fragments = self
            .retry
            .execute("retrieve", || self.retriever.search(sub_question, self.top_k))
            .await
            .map_err(|source| HopError::Retrieval { index, source })?;

        let context = build_context(&fragments);
        let prompt = prompts::summary_prompt(sub_question, &context);

        let summary = self
            .retry
            .execute("summarize", || self.completion.complete(&prompt))
            .await
            .map_err(|source| HopError::Summarization { index, source })?;

        let summary = if fragments.is_empty() {
            tracing::warn!(index, "no evidence retrieved for sub-question");
            format!("{}\n{}", NO_EVIDENCE_MARKER, summary.trim())
        } else {
            summary.trim().to_string()
        };

        self.store
            .put(index, &summary)
            .await
            .map_err(|e| HopError::ArtifactWrite {
                index,
                reason: e.to_string(),
            })?;

        tracing::debug!(index, fragments = fragments.len(), "hop summary stored");
        Ok(Artifact::new(index, summary))
    }
}

/// Join fragments in rank order
pub fn build_context(fragments: &[String]) -> String {
    fragments.join(FRAGMENT_SEPARATOR)
}
