//! Pipeline state machine
//!
//! Deterministic finite state machine for one run:
//! - Safety: no transition outside the table below
//! - Liveness: every run ends in Done or Failed
//! - Determinism: unique next state per (state, event)

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Question accepted, nothing dispatched yet
    Init,

    /// Sub-questions known
    Decomposed,

    /// Hop workers in flight
    HopsRunning,

    /// Every hop reached a terminal state within tolerance
    HopsDone,

    /// Synthesis call in progress
    Synthesizing,

    /// Final answer produced (terminal)
    Done,

    /// Run aborted (terminal)
    Failed,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Decomposer returned at least one sub-question
    Decomposed,

    /// Hop workers dispatched
    HopsDispatched,

    /// All hops settled within the failure tolerance
    HopsSettled,

    /// Artifacts read back and handed to the synthesizer
    SynthesisStarted,

    /// Synthesizer returned the final answer
    SynthesisComplete,

    /// Unrecoverable error
    Fail,
}

impl PipelineState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// 1. Init         → Decomposed   (on: Decomposed)
    /// 2. Decomposed   → HopsRunning  (on: HopsDispatched)
    /// 3. HopsRunning  → HopsDone     (on: HopsSettled)
    /// 4. HopsDone     → Synthesizing (on: SynthesisStarted)
    /// 5. Synthesizing → Done         (on: SynthesisComplete)
    /// 6. any non-terminal → Failed   (on: Fail)
    ///
    /// Terminal states accept no events.
    pub fn transition(&self, event: PipelineEvent) -> Result<PipelineState> {
        use PipelineEvent as E;
        use PipelineState as S;

        let next_state = match (self, event) {
            (S::Init, E::Decomposed) => S::Decomposed,
            (S::Decomposed, E::HopsDispatched) => S::HopsRunning,
            (S::HopsRunning, E::HopsSettled) => S::HopsDone,
            (S::HopsDone, E::SynthesisStarted) => S::Synthesizing,
            (S::Synthesizing, E::SynthesisComplete) => S::Done,
            (from, E::Fail) if !from.is_terminal() => S::Failed,

            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }

    /// Get all valid events from this state
    pub fn valid_events(&self) -> Vec<PipelineEvent> {
        use PipelineEvent as E;
        use PipelineState as S;

        match self {
            S::Init => vec![E::Decomposed, E::Fail],
            S::Decomposed => vec![E::HopsDispatched, E::Fail],
            S::HopsRunning => vec![E::HopsSettled, E::Fail],
            S::HopsDone => vec![E::SynthesisStarted, E::Fail],
            S::Synthesizing => vec![E::SynthesisComplete, E::Fail],
            S::Done | S::Failed => Vec::new(),
        }
    }

    /// Human-readable state name
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineState::Init => "INIT",
            PipelineState::Decomposed => "DECOMPOSED",
            PipelineState::HopsRunning => "HOPS_RUNNING",
            PipelineState::HopsDone => "HOPS_DONE",
            PipelineState::Synthesizing => "SYNTHESIZING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
