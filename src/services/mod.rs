//! External service boundaries
//!
//! The pipeline only sees these traits. Concrete clients for Ollama and
//! Qdrant live alongside; tests substitute scripted implementations.

pub mod ollama;
pub mod qdrant;

use crate::errors::ServiceError;
use async_trait::async_trait;

pub use ollama::{OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
pub use qdrant::QdrantRetriever;

/// Opaque text-completion service
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Generate text for `prompt`
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Ranked similarity search over a document index
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` fragments, best match first; empty when nothing matches
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, ServiceError>;
}

/// Text embedding service used to vectorize queries
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}
