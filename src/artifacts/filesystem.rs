//! Filesystem artifact store
//!
//! Each run owns one directory holding `summary_<index>.txt` files and, once
//! synthesis succeeds, `final_answer.txt`. Writes land in a temporary file
//! first and are renamed into place, so a reader never observes a
//! half-written file.

use super::{check_index, Artifact, ArtifactStore};
use crate::errors::ArtifactError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const SUMMARY_PREFIX: &str = "summary_";
const SUMMARY_SUFFIX: &str = ".txt";

/// File holding the synthesized answer of the run
pub const FINAL_ANSWER_FILE: &str = "final_answer.txt";

/// Artifact store backed by one directory per run
#[derive(Debug)]
pub struct FileArtifactStore {
    dir: PathBuf,
    keep: bool,
}

impl FileArtifactStore {
    /// Create the run directory (and parents) if needed
    pub async fn create(dir: impl Into<PathBuf>, keep: bool) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, keep })
    }

    /// Directory holding this run's summaries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for the summary at `index`
    pub fn file_name(index: usize) -> String {
        format!("{}{}{}", SUMMARY_PREFIX, index, SUMMARY_SUFFIX)
    }

    fn parse_index(file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix(SUMMARY_PREFIX)?
            .strip_suffix(SUMMARY_SUFFIX)?
            .parse()
            .ok()
            .filter(|index| *index > 0)
    }

    /// Stage `contents` next to `name`, then rename it into place
    ///
    /// The staging file is removed again if either step fails.
    async fn write_atomic(&self, name: &str, contents: &str) -> Result<PathBuf, ArtifactError> {
        let target = self.dir.join(name);
        let staging = self.dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));

        let written = match fs::write(&staging, contents).await {
            Ok(()) => fs::rename(&staging, &target).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(target)
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn put(&self, index: usize, summary: &str) -> Result<(), ArtifactError> {
        check_index(index)?;

        let target = self.write_atomic(&Self::file_name(index), summary).await?;
        tracing::debug!(index, path = %target.display(), "artifact written");
        Ok(())
    }

    async fn put_final(&self, answer: &str) -> Result<(), ArtifactError> {
        let target = self.write_atomic(FINAL_ANSWER_FILE, answer).await?;
        tracing::debug!(path = %target.display(), "final answer written");
        Ok(())
    }

    async fn get_all_ordered(&self) -> Result<Vec<Artifact>, ArtifactError> {
        let mut indexed = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(Self::parse_index) else {
                continue;
            };
            indexed.push((index, entry.path()));
        }

        indexed.sort_by_key(|(index, _)| *index);

        let mut artifacts = Vec::with_capacity(indexed.len());
        for (index, path) in indexed {
            let summary = fs::read_to_string(&path).await.map_err(|e| {
                ArtifactError::Corrupt(format!("Failed to read {}: {}", path.display(), e))
            })?;
            artifacts.push(Artifact::new(index, summary));
        }

        Ok(artifacts)
    }

    async fn discard(&self) -> Result<(), ArtifactError> {
        if self.keep {
            return Ok(());
        }

        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
