//! Pipeline orchestrator
//!
//! Drives one run through the state machine:
//! INIT → DECOMPOSED → HOPS_RUNNING → HOPS_DONE → SYNTHESIZING → DONE,
//! moving to FAILED on the first unrecoverable error.
//!
//! Hops fan out through a bounded `buffer_unordered` stream. Once more hops
//! have failed than the tolerance allows, the stream is dropped: in-flight
//! hops are cancelled and undispatched ones never start.

use super::{
    Decomposer, FailedHop, FinalAnswer, HopWorker, PipelineEvent, PipelineState, Question,
    SubQuestion, SynthesisInput, Synthesizer,
};
use crate::artifacts::{ArtifactBackend, ArtifactStore, ArtifactStoreFactory};
use crate::config::PipelineConfig;
use crate::errors::{ArtifactError, PipelineError, Result};
use crate::retry::RetryManager;
use crate::services::{OllamaClient, QdrantRetriever, Retriever, TextCompletion};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Multi-hop question answering pipeline
pub struct Orchestrator {
    completion: Arc<dyn TextCompletion>,
    retriever: Arc<dyn Retriever>,
    artifacts: Arc<dyn ArtifactStoreFactory>,
    telemetry: TelemetryCollector,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Create an orchestrator over injected services
    ///
    /// The artifact backend follows `config.artifacts`.
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        retriever: Arc<dyn Retriever>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            completion,
            retriever,
            artifacts: Arc::new(ArtifactBackend::from_config(&config)),
            telemetry: TelemetryCollector::new(),
            config,
        }
    }

    /// Use a specific artifact store factory
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStoreFactory>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Record run events into `telemetry`
    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Build Ollama and Qdrant clients from configuration
    ///
    /// Ollama serves both completions and query embeddings.
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let ollama = Arc::new(OllamaClient::with_timeout(
            &config.ollama_url(),
            &config.ollama.model,
            &config.ollama.embedding_model,
            Duration::from_secs(config.ollama.request_timeout_secs),
        )?);

        if !ollama.health_check().await {
            tracing::warn!(url = %config.ollama_url(), "Ollama did not answer the health check");
        }

        let retriever = Arc::new(QdrantRetriever::new(&config.retrieval, ollama.clone())?);
        Ok(Self::new(ollama, retriever, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    /// Answer `question`, or report the stage that failed
    ///
    /// Events are recorded under a fresh run id, so concurrent runs on one
    /// orchestrator stay separable through `TelemetryCollector::states_for`.
    pub async fn run(&self, question: &str) -> Result<FinalAnswer> {
        let question = Question::new(question)?;
        self.config.validate()?;
        let run_id = Uuid::new_v4();

        let span = tracing::info_span!("run", %run_id);
        async {
            tracing::info!(question = %question, "run started");
            let mut state = RunState::new(self.telemetry.for_run(run_id));

            match self.drive(&mut state, run_id, &question).await {
                Ok(answer) => {
                    tracing::info!(
                        sub_questions = answer.sub_questions.len(),
                        failed_hops = answer.failed_hops.len(),
                        "run finished"
                    );
                    Ok(answer)
                }
                Err(e) => {
                    state.fail();
                    tracing::error!(stage = ?e.stage(), error = %e, "run failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        state: &mut RunState,
        run_id: Uuid,
        question: &Question,
    ) -> Result<FinalAnswer> {
        let retry = self.retry_manager(&state.telemetry);

        let sub_questions = Decomposer::new(self.completion.clone(), retry.clone())
            .decompose(question)
            .await?;
        state.advance(PipelineEvent::Decomposed)?;

        let store = self.artifacts.open(run_id).await?;
        let outcome = self
            .hops_and_synthesis(state, question, &sub_questions, store.clone(), retry)
            .await;

        if let Err(e) = store.discard().await {
            tracing::warn!(error = %e, "failed to discard run artifacts");
        }

        let (text, failed_hops) = outcome?;
        Ok(FinalAnswer {
            run_id,
            text,
            sub_questions,
            failed_hops,
        })
    }

    async fn hops_and_synthesis(
        &self,
        state: &mut RunState,
        question: &Question,
        sub_questions: &[SubQuestion],
        store: Arc<dyn ArtifactStore>,
        retry: RetryManager,
    ) -> Result<(String, Vec<FailedHop>)> {
        let worker = HopWorker::new(
            self.retriever.clone(),
            self.completion.clone(),
            store.clone(),
            retry.clone(),
        )
        .with_top_k(self.config.retrieval.top_k);

        state.advance(PipelineEvent::HopsDispatched)?;
        let failed = self
            .dispatch_hops(&worker, sub_questions, &state.telemetry)
            .await?;
        state.advance(PipelineEvent::HopsSettled)?;

        let inputs = store
            .get_all_ordered()
            .await?
            .into_iter()
            .map(|artifact| -> Result<SynthesisInput> {
                let sub_question = sub_questions
                    .get(artifact.index.wrapping_sub(1))
                    .cloned()
                    .ok_or_else(|| {
                        ArtifactError::Corrupt(format!(
                            "artifact index {} has no sub-question",
                            artifact.index
                        ))
                    })?;
                Ok(SynthesisInput {
                    index: artifact.index,
                    sub_question,
                    summary: artifact.summary,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let unanswered: Vec<String> = failed.iter().map(|f| f.sub_question.clone()).collect();

        state.advance(PipelineEvent::SynthesisStarted)?;
        let text = Synthesizer::new(self.completion.clone(), retry)
            .synthesize(question, &inputs, &unanswered)
            .await?;
        // Must land before discard so kept run directories hold the answer
        store.put_final(&text).await?;
        state.advance(PipelineEvent::SynthesisComplete)?;

        Ok((text, failed))
    }

    /// Run one hop per sub-question, indices 1..=N
    ///
    /// Returns the failed hops (sorted by index) when the run may continue.
    async fn dispatch_hops(
        &self,
        worker: &HopWorker,
        sub_questions: &[SubQuestion],
        telemetry: &TelemetryCollector,
    ) -> Result<Vec<FailedHop>> {
        let total = sub_questions.len();
        let allowed = allowed_failures(total, self.config.hops.failure_tolerance);

        telemetry.record(TelemetryEvent::HopsDispatched {
            hop_count: total,
            timestamp: Instant::now(),
        });
        tracing::info!(hops = total, allowed_failures = allowed, "dispatching hops");

        let mut hops = stream::iter(sub_questions.iter().enumerate().map(|(position, sub_question)| {
            let index = position + 1;
            let telemetry = telemetry.clone();
            async move {
                telemetry.record(TelemetryEvent::HopStarted {
                    index,
                    timestamp: Instant::now(),
                });
                let started = Instant::now();
                let result = worker.run_hop(index, sub_question).await;
                telemetry.record(TelemetryEvent::HopCompleted {
                    index,
                    duration_ms: started.elapsed().as_millis() as u64,
                    success: result.is_ok(),
                    timestamp: Instant::now(),
                });
                (index, sub_question, result)
            }
        }))
        .buffer_unordered(self.config.hops.max_concurrent.max(1));

        let mut failed = Vec::new();
        while let Some((index, sub_question, result)) = hops.next().await {
            let Err(error) = result else {
                continue;
            };

            tracing::warn!(index, kind = error.kind(), error = %error, "hop failed");
            failed.push(FailedHop {
                index,
                sub_question: sub_question.clone(),
                error,
            });

            if failed.len() > allowed {
                drop(hops);
                failed.sort_by_key(|f| f.index);
                return Err(PipelineError::HopToleranceExceeded {
                    failed,
                    total,
                    allowed,
                });
            }
        }

        failed.sort_by_key(|f| f.index);

        // Nothing to synthesize without at least one summary
        if failed.len() == total {
            return Err(PipelineError::HopToleranceExceeded {
                failed,
                total,
                allowed,
            });
        }

        Ok(failed)
    }

    fn retry_manager(&self, telemetry: &TelemetryCollector) -> RetryManager {
        RetryManager::from_config(&self.config.retry).with_telemetry(telemetry.clone())
    }
}

/// Largest number of hop failures a run of `total` hops survives
pub fn allowed_failures(total: usize, tolerance: f64) -> usize {
    let tolerance = tolerance.clamp(0.0, 1.0);
    // Epsilon absorbs products like 0.29 * 100 = 28.999...
    ((tolerance * total as f64) + 1e-9).floor() as usize
}

/// Current state of one run, mirrored into telemetry
struct RunState {
    current: PipelineState,
    telemetry: TelemetryCollector,
}

impl RunState {
    fn new(telemetry: TelemetryCollector) -> Self {
        Self {
            current: PipelineState::Init,
            telemetry,
        }
    }

    fn advance(&mut self, event: PipelineEvent) -> Result<()> {
        let next = self.current.transition(event)?;
        tracing::debug!(from = %self.current, to = %next, "state transition");
        self.telemetry.record(TelemetryEvent::StateTransition {
            from: self.current,
            to: next,
            timestamp: Instant::now(),
        });
        self.current = next;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.current.is_terminal() {
            let _ = self.advance(PipelineEvent::Fail);
        }
    }
}
