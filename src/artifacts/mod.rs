//! Artifact storage for hop summaries
//!
//! An artifact is the summary produced by one hop, keyed by its 1-based
//! index. Each run gets its own store from an [`ArtifactStoreFactory`]; the
//! store only has to keep what was written visible until the run reads it
//! back.

pub mod filesystem;
pub mod memory;

use crate::config::{ArtifactBackendKind, PipelineConfig};
use crate::errors::ArtifactError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub use filesystem::FileArtifactStore;
pub use memory::InMemoryArtifactStore;

/// A persisted hop summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub index: usize,
    pub summary: String,
}

impl Artifact {
    pub fn new(index: usize, summary: impl Into<String>) -> Self {
        Self {
            index,
            summary: summary.into(),
        }
    }
}

/// Durable index → summary mapping for one run
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert or overwrite the summary at `index`
    async fn put(&self, index: usize, summary: &str) -> Result<(), ArtifactError>;

    /// All artifacts, ascending by index
    async fn get_all_ordered(&self) -> Result<Vec<Artifact>, ArtifactError>;

    /// Record the synthesized answer alongside the summaries
    async fn put_final(&self, _answer: &str) -> Result<(), ArtifactError> {
        Ok(())
    }

    /// Release whatever the store holds once the run is over
    async fn discard(&self) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Opens a fresh store per run
#[async_trait]
pub trait ArtifactStoreFactory: Send + Sync {
    async fn open(&self, run_id: Uuid) -> Result<Arc<dyn ArtifactStore>, ArtifactError>;
}

/// Configured artifact backend
#[derive(Debug, Clone)]
pub enum ArtifactBackend {
    Memory,
    Filesystem { root: PathBuf, keep: bool },
}

impl ArtifactBackend {
    pub fn from_config(config: &PipelineConfig) -> Self {
        match config.artifacts.backend {
            ArtifactBackendKind::Memory => ArtifactBackend::Memory,
            ArtifactBackendKind::Filesystem => ArtifactBackend::Filesystem {
                root: config.artifacts_dir(),
                keep: config.artifacts.keep,
            },
        }
    }
}

#[async_trait]
impl ArtifactStoreFactory for ArtifactBackend {
    async fn open(&self, run_id: Uuid) -> Result<Arc<dyn ArtifactStore>, ArtifactError> {
        match self {
            ArtifactBackend::Memory => Ok(Arc::new(InMemoryArtifactStore::new())),
            ArtifactBackend::Filesystem { root, keep } => {
                let store = FileArtifactStore::create(root.join(run_id.to_string()), *keep).await?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Indices are 1-based; zero never names a hop
pub(crate) fn check_index(index: usize) -> Result<(), ArtifactError> {
    if index == 0 {
        return Err(ArtifactError::Corrupt(
            "artifact indices start at 1".to_string(),
        ));
    }
    Ok(())
}
