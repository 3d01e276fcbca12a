//! Error types for the multi-hop pipeline
//!
//! Errors are layered the way the pipeline is: external service calls fail
//! with [`ServiceError`], a single hop fails with [`HopError`], the artifact
//! store fails with [`ArtifactError`], and a run as a whole fails with
//! [`PipelineError`].

use crate::pipeline::FailedHop;
use thiserror::Error;

/// Failure of one call to an external service (completion or retrieval)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Service could not be reached or answered with a server error
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Call did not complete within its time bound
    #[error("Call timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Service answered, but with something unusable
    #[error("Invalid service response: {0}")]
    InvalidResponse(String),

    /// Retry budget spent on transient failures
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_) | ServiceError::Timeout { .. })
    }
}

/// Permanent failure of one hop, tagged with its index
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HopError {
    #[error("Retrieval failed for hop {index}: {source}")]
    Retrieval {
        index: usize,
        #[source]
        source: ServiceError,
    },

    #[error("Summarization failed for hop {index}: {source}")]
    Summarization {
        index: usize,
        #[source]
        source: ServiceError,
    },

    #[error("Artifact write failed for hop {index}: {reason}")]
    ArtifactWrite { index: usize, reason: String },
}

impl HopError {
    /// Hop index the failure belongs to
    pub fn index(&self) -> usize {
        match self {
            HopError::Retrieval { index, .. }
            | HopError::Summarization { index, .. }
            | HopError::ArtifactWrite { index, .. } => *index,
        }
    }

    /// Name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            HopError::Retrieval { .. } => "RetrievalFailure",
            HopError::Summarization { .. } => "SummarizationFailure",
            HopError::ArtifactWrite { .. } => "ArtifactWriteFailure",
        }
    }
}

/// Artifact store errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt artifact store: {0}")]
    Corrupt(String),
}

/// Pipeline stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Input,
    Setup,
    Decomposition,
    Hops,
    Artifacts,
    Synthesis,
}

/// Main error type returned by a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Caller supplied a blank question
    #[error("Question must not be empty")]
    EmptyQuestion,

    /// No usable sub-questions, or the completion call failed after retries
    #[error("Decomposition failed: {reason}")]
    DecompositionFailure {
        reason: String,
        #[source]
        source: Option<ServiceError>,
    },

    /// Too many hops failed permanently
    #[error("{} of {total} hops failed (at most {allowed} tolerated): indices {:?}", .failed.len(), failed_indices(.failed))]
    HopToleranceExceeded {
        failed: Vec<FailedHop>,
        total: usize,
        allowed: usize,
    },

    /// Artifact store could not be opened or read back
    #[error("Artifact store error: {0}")]
    ArtifactStore(#[from] ArtifactError),

    /// Synthesis completion call failed after retries
    #[error("Synthesis failed: {0}")]
    SynthesisFailure(#[source] ServiceError),

    /// State machine transition errors
    #[error("Invalid state transition from {from} via {event}: {reason}")]
    InvalidTransition {
        from: String,
        event: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Stage of the pipeline this error surfaced from
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::EmptyQuestion => PipelineStage::Input,
            PipelineError::DecompositionFailure { .. } => PipelineStage::Decomposition,
            PipelineError::HopToleranceExceeded { .. } => PipelineStage::Hops,
            PipelineError::ArtifactStore(_) => PipelineStage::Artifacts,
            PipelineError::SynthesisFailure(_) => PipelineStage::Synthesis,
            PipelineError::InvalidTransition { .. }
            | PipelineError::ConfigError(_)
            | PipelineError::HttpError(_)
            | PipelineError::IoError(_) => PipelineStage::Setup,
        }
    }
}

fn failed_indices(failed: &[FailedHop]) -> Vec<usize> {
    failed.iter().map(|f| f.index).collect()
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
