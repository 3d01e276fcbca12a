//! Configuration management for the multi-hop pipeline
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.multihop/config.toml

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub hops: HopsConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Ollama connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
}

/// Similarity search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub qdrant_url: String,
    pub collection: String,
    pub top_k: usize,
    pub score_threshold: f32,
    /// Payload field holding the fragment text
    pub content_field: String,
}

/// Retry and timeout policy for external calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub call_timeout_secs: u64,
}

/// Hop fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HopsConfig {
    /// Fraction of hops allowed to fail permanently before the run aborts
    ///
    /// Even at 1.0 a run needs one successful hop to have anything to synthesize.
    pub failure_tolerance: f64,
    /// Hops in flight at once; 1 runs them sequentially
    pub max_concurrent: usize,
}

/// Artifact storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackendKind {
    Memory,
    Filesystem,
}

/// Artifact storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub backend: ArtifactBackendKind,
    pub dir: String,
    /// Keep the per-run directory after the run ends
    pub keep: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "qwen2.5:7b-instruct".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "documents".to_string(),
            top_k: 5,
            score_threshold: 0.0,
            content_field: "document".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter: true,
            call_timeout_secs: 60,
        }
    }
}

impl Default for HopsConfig {
    fn default() -> Self {
        Self {
            failure_tolerance: 0.5,
            max_concurrent: 4,
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            backend: ArtifactBackendKind::Memory,
            dir: "~/.multihop/runs".to_string(),
            keep: false,
        }
    }
}

impl RetryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl PipelineConfig {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: PipelineConfig = toml::from_str(&contents)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(PipelineConfig::default())
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".multihop").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.hops.failure_tolerance) {
            return Err(PipelineError::ConfigError(
                "failure_tolerance must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.hops.max_concurrent == 0 {
            return Err(PipelineError::ConfigError(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(PipelineError::ConfigError(
                "top_k must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(PipelineError::ConfigError(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.call_timeout_secs == 0 {
            return Err(PipelineError::ConfigError(
                "call_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.ollama.model.trim().is_empty() {
            return Err(PipelineError::ConfigError("model must be set".to_string()));
        }

        if self.retrieval.collection.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "collection must be set".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Root directory for filesystem artifacts
    pub fn artifacts_dir(&self) -> PathBuf {
        Self::expand_path(&self.artifacts.dir)
    }
}
