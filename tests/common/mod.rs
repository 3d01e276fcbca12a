//! Scripted services shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use multihop::config::PipelineConfig;
use multihop::errors::ServiceError;
use multihop::services::{Retriever, TextCompletion};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SUMMARY_HEADER: &str = "You are summarizing retrieved documents for the sub-question: ";

/// Config with near-zero backoff so retries finish quickly
pub fn fast_config() -> PipelineConfig {
    multihop::init_tracing();

    let mut config = PipelineConfig::default();
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config.retry.call_timeout_secs = 1;
    config
}

/// Everything the completion service was asked
#[derive(Debug, Default)]
pub struct CompletionLog {
    pub decompositions: usize,
    pub summary_prompts: Vec<String>,
    pub synthesis_prompts: Vec<String>,
}

/// Completion service that answers each prompt kind from a script
pub struct ScriptedCompletion {
    decomposition: String,
    answer: String,
    failing_summaries: Vec<String>,
    pub log: Mutex<CompletionLog>,
}

impl ScriptedCompletion {
    pub fn new(sub_questions: &[&str]) -> Arc<Self> {
        Self::with_decomposition(&sub_questions.join("\n"))
    }

    pub fn with_decomposition(raw: &str) -> Arc<Self> {
        Arc::new(Self::script(raw))
    }

    /// Like `new`, but summarizing any of `failing` is always unavailable
    pub fn with_failing_summaries(sub_questions: &[&str], failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing_summaries: failing.iter().map(|q| q.to_string()).collect(),
            ..Self::script(&sub_questions.join("\n"))
        })
    }

    fn script(raw: &str) -> Self {
        Self {
            decomposition: raw.to_string(),
            answer: "A and B differ in origin.\n\n## Comparison\n\n| Aspect | A | B |\n|---|---|---|\n| Origin | old | new |"
                .to_string(),
            failing_summaries: Vec::new(),
            log: Mutex::new(CompletionLog::default()),
        }
    }

    pub fn synthesis_calls(&self) -> usize {
        self.log.lock().unwrap().synthesis_prompts.len()
    }

    pub fn synthesis_prompt(&self) -> String {
        self.log.lock().unwrap().synthesis_prompts[0].clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let mut log = self.log.lock().unwrap();

        if prompt.contains("Break the question") {
            log.decompositions += 1;
            return Ok(self.decomposition.clone());
        }

        if let Some(rest) = prompt.strip_prefix(SUMMARY_HEADER) {
            log.summary_prompts.push(prompt.to_string());
            let sub_question = rest.lines().next().unwrap_or_default();
            if self.failing_summaries.iter().any(|q| q == sub_question) {
                return Err(ServiceError::Unavailable("model not loaded".to_string()));
            }
            return Ok(format!("- Evidence about: {}", sub_question));
        }

        log.synthesis_prompts.push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// How the retriever treats one query
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return these fragments
    Docs(Vec<String>),
    /// Match nothing
    Empty,
    /// Always unavailable
    Down,
    /// Wait before returning default fragments
    Slow(Duration),
    /// Hang past any timeout for the first `n` calls, then answer
    StallFirst(u32),
}

/// Retriever with per-query behavior and call counters
pub struct ScriptedRetriever {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedRetriever {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn on(mut self, query: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(query.to_string(), behavior);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls_for(&self, query: &str) -> u32 {
        self.calls.lock().unwrap().get(query).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    fn default_docs(query: &str) -> Vec<String> {
        vec![
            format!("Fragment one about {}", query),
            format!("Fragment two about {}", query),
        ]
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, ServiceError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(query.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let docs = match self.behaviors.get(query) {
            None => Self::default_docs(query),
            Some(Behavior::Docs(docs)) => docs.clone(),
            Some(Behavior::Empty) => Vec::new(),
            Some(Behavior::Down) => {
                return Err(ServiceError::Unavailable("index offline".to_string()))
            }
            Some(Behavior::Slow(delay)) => {
                tokio::time::sleep(*delay).await;
                Self::default_docs(query)
            }
            Some(Behavior::StallFirst(n)) => {
                if call <= *n {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Self::default_docs(query)
            }
        };

        Ok(docs.into_iter().take(k).collect())
    }
}
