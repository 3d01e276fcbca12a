//! In-memory artifact store

use super::{check_index, Artifact, ArtifactStore};
use crate::errors::ArtifactError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Artifact store held in a sorted map
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: RwLock<BTreeMap<usize, String>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, index: usize, summary: &str) -> Result<(), ArtifactError> {
        check_index(index)?;
        self.entries.write().await.insert(index, summary.to_string());
        Ok(())
    }

    async fn get_all_ordered(&self) -> Result<Vec<Artifact>, ArtifactError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(index, summary)| Artifact::new(*index, summary.clone()))
            .collect())
    }

    async fn discard(&self) -> Result<(), ArtifactError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryArtifactStore::new();
        store.put(1, "first").await.unwrap();
        store.put(1, "second").await.unwrap();

        let artifacts = store.get_all_ordered().await.unwrap();
        assert_eq!(artifacts, vec![Artifact::new(1, "second")]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_ordered_regardless_of_write_order() {
        let store = InMemoryArtifactStore::new();
        for index in [3, 1, 2] {
            store.put(index, &format!("summary {}", index)).await.unwrap();
        }

        let indices: Vec<usize> = store
            .get_all_ordered()
            .await
            .unwrap()
            .iter()
            .map(|a| a.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_all_visible() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let mut handles = Vec::new();

        for index in 1..=8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(index, &format!("summary {}", index)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let artifacts = store.get_all_ordered().await.unwrap();
        assert_eq!(artifacts.len(), 8);
        assert_eq!(artifacts[7], Artifact::new(8, "summary 8"));
    }

    #[tokio::test]
    async fn test_zero_index_rejected() {
        let store = InMemoryArtifactStore::new();
        assert!(matches!(
            store.put(0, "nope").await,
            Err(ArtifactError::Corrupt(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_discard_clears() {
        let store = InMemoryArtifactStore::new();
        store.put(1, "summary").await.unwrap();
        store.discard().await.unwrap();
        assert!(store.is_empty().await);
    }
}
