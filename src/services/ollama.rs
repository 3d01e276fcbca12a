//! Ollama API client
//!
//! Completion goes through `POST /api/generate` with streaming enabled; the
//! NDJSON chunks are stitched back into one response. Query embeddings use
//! `POST /api/embeddings`.

use crate::errors::{PipelineError, Result, ServiceError};
use crate::services::{Embedder, TextCompletion};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Request timeout (120 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama completion and embedding client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str) -> Result<Self> {
        Self::with_timeout(base_url, model, DEFAULT_EMBEDDING_MODEL, REQUEST_TIMEOUT)
    }

    /// Create Ollama client with explicit embedding model and request timeout
    pub fn with_timeout(
        base_url: &str,
        model: &str,
        embedding_model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PipelineError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
            timeout,
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, error: reqwest::Error) -> ServiceError {
        if error.is_timeout() {
            ServiceError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ServiceError::Unavailable(format!("Failed to reach Ollama: {}", error))
        }
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<reqwest::Response, ServiceError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(classify_status(status, &error_text))
    }
}

#[async_trait]
impl TextCompletion for OllamaClient {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceError> {
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        let response = self.post_json("/api/generate", &request).await?;
        let mut stream = response.bytes_stream();
        let mut assembler = ResponseAssembler::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| self.map_send_error(e))?;
            if assembler.push(&bytes)? {
                break;
            }
        }

        let text = assembler.finish()?;
        tracing::debug!(
            model = %self.model,
            prompt_bytes = prompt.len(),
            response_bytes = text.len(),
            "completion received"
        );
        Ok(text)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ServiceError> {
        let request = OllamaEmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response = self.post_json("/api/embeddings", &request).await?;
        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("Failed to parse embedding: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(ServiceError::InvalidResponse(
                "Ollama returned an empty embedding".to_string(),
            ));
        }

        Ok(body.embedding)
    }
}

fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let message = format!("HTTP {}: {}", status, body.trim());
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        ServiceError::Timeout { duration_ms: 0 }
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ServiceError::Unavailable(message)
    } else {
        ServiceError::InvalidResponse(message)
    }
}

/// Reassembles a streamed `/api/generate` body
///
/// Chunks do not respect line boundaries, so partial lines are buffered until
/// their newline arrives.
#[derive(Debug, Default)]
struct ResponseAssembler {
    buffer: Vec<u8>,
    text: String,
    done: bool,
}

impl ResponseAssembler {
    /// Feed bytes; returns true once the final chunk has been seen
    fn push(&mut self, bytes: &[u8]) -> std::result::Result<bool, ServiceError> {
        self.buffer.extend_from_slice(bytes);

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.consume_line(&line)?;
            if self.done {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn consume_line(&mut self, line: &[u8]) -> std::result::Result<(), ServiceError> {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let chunk: OllamaGenerateChunk = serde_json::from_str(trimmed)
            .map_err(|e| ServiceError::InvalidResponse(format!("Malformed stream chunk: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(ServiceError::Unavailable(format!("Ollama error: {}", error)));
        }

        self.text.push_str(&chunk.response);
        self.done = chunk.done;
        Ok(())
    }

    fn finish(mut self) -> std::result::Result<String, ServiceError> {
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.consume_line(&rest)?;
        }

        if !self.done {
            return Err(ServiceError::Unavailable(
                "Ollama stream ended before completion".to_string(),
            ));
        }

        Ok(self.text)
    }
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One NDJSON line of a streamed generate response
#[derive(Debug, Deserialize)]
struct OllamaGenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::new().unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.embedding_model(), DEFAULT_EMBEDDING_MODEL);
        assert_eq!(client.base_url(), DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_client_with_config_trims_slash() {
        let client = OllamaClient::with_config("http://localhost:11434/", "llama2:7b").unwrap();
        assert_eq!(client.model(), "llama2:7b");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_assembler_joins_split_chunks() {
        let mut assembler = ResponseAssembler::default();

        assert!(!assembler.push(b"{\"response\":\"Hel\",\"done\":false}\n{\"resp").unwrap());
        assert!(!assembler.push(b"onse\":\"lo\",\"done\":false}\n").unwrap());
        assert!(assembler.push(b"{\"response\":\"!\",\"done\":true}\n").unwrap());

        assert_eq!(assembler.finish().unwrap(), "Hello!");
    }

    #[test]
    fn test_assembler_final_line_without_newline() {
        let mut assembler = ResponseAssembler::default();
        assembler.push(b"{\"response\":\"ok\",\"done\":true}").unwrap();
        assert_eq!(assembler.finish().unwrap(), "ok");
    }

    #[test]
    fn test_assembler_truncated_stream_is_unavailable() {
        let mut assembler = ResponseAssembler::default();
        assembler.push(b"{\"response\":\"partial\",\"done\":false}\n").unwrap();
        assert!(matches!(
            assembler.finish(),
            Err(ServiceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_assembler_reports_stream_error() {
        let mut assembler = ResponseAssembler::default();
        let result = assembler.push(b"{\"error\":\"model not loaded\"}\n");
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "busy").is_retryable());
        assert!(classify_status(StatusCode::GATEWAY_TIMEOUT, "").is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, "model not found").is_retryable());
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Ollama
    async fn test_live_completion() {
        let client = OllamaClient::new().unwrap();
        let text = client.complete("Say hello in one word.").await.unwrap();
        assert!(!text.is_empty());
    }
}
