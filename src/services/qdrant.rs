//! Qdrant-backed retrieval
//!
//! Queries are embedded through an [`Embedder`], then matched against a
//! single Qdrant collection. Fragment text is read from one payload field.

use crate::config::RetrievalConfig;
use crate::errors::{PipelineError, Result, ServiceError};
use crate::services::{Embedder, Retriever};
use anyhow::Context;
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        value::Kind, with_payload_selector::SelectorOptions, ScoredPoint, SearchPoints,
        Value as QdrantValue, WithPayloadSelector,
    },
};
use std::collections::HashMap;
use std::sync::Arc;

/// Similarity search over a Qdrant collection
pub struct QdrantRetriever {
    client: QdrantClient,
    embedder: Arc<dyn Embedder>,
    collection: String,
    content_field: String,
    score_threshold: Option<f32>,
}

impl QdrantRetriever {
    /// Connect to the Qdrant instance named in `config`
    pub fn new(config: &RetrievalConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = QdrantClient::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create Qdrant client: {}", e))
            })?;

        Ok(Self {
            client,
            embedder,
            collection: config.collection.clone(),
            content_field: config.content_field.clone(),
            score_threshold: (config.score_threshold > 0.0).then_some(config.score_threshold),
        })
    }

    /// Collection being searched
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn search_points(&self, vector: Vec<f32>, k: usize) -> anyhow::Result<Vec<ScoredPoint>> {
        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector,
                limit: k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                score_threshold: self.score_threshold,
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to search collection: {}", self.collection))?;

        Ok(response.result)
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn search(&self, query: &str, k: usize) -> std::result::Result<Vec<String>, ServiceError> {
        let vector = self.embedder.embed(query).await?;

        let points = self
            .search_points(vector, k)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("{:#}", e)))?;

        let fragments = extract_fragments(points.iter().map(|p| &p.payload), &self.content_field);
        tracing::debug!(
            collection = %self.collection,
            requested = k,
            returned = fragments.len(),
            "similarity search complete"
        );
        Ok(fragments)
    }
}

/// Pull the text field out of each payload, preserving rank order
fn extract_fragments<'a>(
    payloads: impl Iterator<Item = &'a HashMap<String, QdrantValue>>,
    field: &str,
) -> Vec<String> {
    payloads
        .filter_map(|payload| payload.get(field).and_then(qdrant_value_to_string))
        .filter(|text| !text.trim().is_empty())
        .collect()
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}
