//! multihop - multi-hop retrieval-augmented question answering
//!
//! A question is decomposed into sub-questions, each sub-question is
//! answered by an independent retrieve-and-summarize hop, and the stored
//! summaries are synthesized into one structured answer.
//!
//! # Architecture
//!
//! - **services**: text completion (Ollama) and retrieval (Qdrant) boundaries
//! - **retry**: per-call timeouts with exponential backoff
//! - **artifacts**: per-run summary storage (memory or filesystem)
//! - **pipeline**: decomposer, hop worker, synthesizer, orchestrator

pub mod errors;
pub mod config;
pub mod telemetry;
pub mod services;
pub mod retry;
pub mod artifacts;
pub mod pipeline;

// Re-export commonly used types
pub use errors::{PipelineError, Result};
pub use config::PipelineConfig;
pub use pipeline::{FinalAnswer, Orchestrator, PipelineState};
pub use telemetry::{init_tracing, TelemetryCollector};
