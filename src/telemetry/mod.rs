//! Telemetry for pipeline runs
//!
//! Structured logs go through `tracing`; [`TelemetryCollector`] keeps an
//! in-process event log and counters that callers and tests can inspect.

use crate::pipeline::PipelineState;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Install a formatted `tracing` subscriber filtered by `RUST_LOG`
///
/// Defaults to `multihop=info`. Safe to call more than once.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("multihop=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    StateTransition {
        from: PipelineState,
        to: PipelineState,
        timestamp: Instant,
    },
    HopsDispatched {
        hop_count: usize,
        timestamp: Instant,
    },
    HopStarted {
        index: usize,
        timestamp: Instant,
    },
    HopCompleted {
        index: usize,
        duration_ms: u64,
        success: bool,
        timestamp: Instant,
    },
    RetryAttempt {
        operation: String,
        attempt: u32,
        timestamp: Instant,
    },
    CallTimedOut {
        operation: String,
        timeout_ms: u64,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub state_transitions: usize,
    pub hops_dispatched: usize,
    pub hops_started: usize,
    pub hops_succeeded: usize,
    pub hops_failed: usize,
    pub retry_attempts: usize,
    pub timeouts: usize,
}

/// Upper bound on retained events (oldest evicted first)
pub const MAX_EVENTS: usize = 10_000;

/// An event tagged with the run that produced it
#[derive(Debug, Clone)]
struct RecordedEvent {
    run_id: Option<Uuid>,
    event: TelemetryEvent,
}

/// Telemetry collector
///
/// Clones share one bounded event log and one set of counters. A handle
/// from [`TelemetryCollector::for_run`] tags everything it records with that
/// run's id, so concurrent or successive runs stay separable.
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<RecordedEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    max_events: usize,
    run_id: Option<Uuid>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    /// Create a collector retaining at most `max_events` events
    pub fn with_capacity(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            max_events,
            run_id: None,
            start_time: Instant::now(),
        }
    }

    /// Handle sharing this log that tags events with `run_id`
    pub fn for_run(&self, run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            ..self.clone()
        }
    }

    /// Run this handle records for, if scoped
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::StateTransition { .. } => stats.state_transitions += 1,
                TelemetryEvent::HopsDispatched { hop_count, .. } => {
                    stats.hops_dispatched += hop_count
                }
                TelemetryEvent::HopStarted { .. } => stats.hops_started += 1,
                TelemetryEvent::HopCompleted { success, .. } => {
                    if *success {
                        stats.hops_succeeded += 1;
                    } else {
                        stats.hops_failed += 1;
                    }
                }
                TelemetryEvent::RetryAttempt { .. } => stats.retry_attempts += 1,
                TelemetryEvent::CallTimedOut { .. } => stats.timeouts += 1,
            }
        }

        let mut events = lock(&self.events);
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(RecordedEvent {
            run_id: self.run_id,
            event,
        });
    }

    /// Get current statistics (all runs)
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Get retained event count
    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).map(|r| r.event.clone()).collect()
    }

    /// Runs with retained events, in first-seen order
    pub fn run_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for id in lock(&self.events).iter().filter_map(|r| r.run_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Path through the state machine of this handle's run, or of the most
    /// recently active run for an unscoped handle
    pub fn states(&self) -> Vec<PipelineState> {
        let events = lock(&self.events);
        let run = self.run_id.or_else(|| latest_run(&events));
        state_path(&events, run)
    }

    /// Path through the state machine of one run
    pub fn states_for(&self, run_id: Uuid) -> Vec<PipelineState> {
        state_path(&lock(&self.events), Some(run_id))
    }

    /// Indices of hops that were started, in start order, for the same run
    /// [`TelemetryCollector::states`] reports on
    pub fn started_hops(&self) -> Vec<usize> {
        let events = lock(&self.events);
        let run = self.run_id.or_else(|| latest_run(&events));
        events
            .iter()
            .filter(|r| r.run_id == run)
            .filter_map(|r| match r.event {
                TelemetryEvent::HopStarted { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    /// Calculate hop success rate
    pub fn hop_success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.hops_succeeded + stats.hops_failed;
        if total == 0 {
            1.0
        } else {
            stats.hops_succeeded as f64 / total as f64
        }
    }
}

fn latest_run(events: &VecDeque<RecordedEvent>) -> Option<Uuid> {
    events.back().and_then(|r| r.run_id)
}

fn state_path(events: &VecDeque<RecordedEvent>, run: Option<Uuid>) -> Vec<PipelineState> {
    let mut states = Vec::new();
    for recorded in events.iter().filter(|r| r.run_id == run) {
        if let TelemetryEvent::StateTransition { from, to, .. } = recorded.event {
            if states.is_empty() {
                states.push(from);
            }
            states.push(to);
        }
    }
    states
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock only means another recorder panicked mid-push; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let collector = TelemetryCollector::new();
        assert_eq!(collector.event_count(), 0);
        assert_eq!(collector.get_stats().hops_started, 0);
        assert!(collector.states().is_empty());
    }

    #[test]
    fn test_record_hop_events() {
        let collector = TelemetryCollector::new();

        collector.record(TelemetryEvent::HopsDispatched {
            hop_count: 3,
            timestamp: Instant::now(),
        });
        collector.record(TelemetryEvent::HopStarted {
            index: 2,
            timestamp: Instant::now(),
        });
        collector.record(TelemetryEvent::HopCompleted {
            index: 2,
            duration_ms: 12,
            success: true,
            timestamp: Instant::now(),
        });

        let stats = collector.get_stats();
        assert_eq!(stats.hops_dispatched, 3);
        assert_eq!(stats.hops_started, 1);
        assert_eq!(stats.hops_succeeded, 1);
        assert_eq!(collector.started_hops(), vec![2]);
    }

    #[test]
    fn test_hop_success_rate() {
        let collector = TelemetryCollector::new();
        assert_eq!(collector.hop_success_rate(), 1.0);

        for (index, success) in [(1, true), (2, true), (3, false)] {
            collector.record(TelemetryEvent::HopCompleted {
                index,
                duration_ms: 1,
                success,
                timestamp: Instant::now(),
            });
        }

        assert!((collector.hop_success_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_states_follow_transitions() {
        let collector = TelemetryCollector::new();
        collector.record(TelemetryEvent::StateTransition {
            from: PipelineState::Init,
            to: PipelineState::Decomposed,
            timestamp: Instant::now(),
        });
        collector.record(TelemetryEvent::StateTransition {
            from: PipelineState::Decomposed,
            to: PipelineState::Failed,
            timestamp: Instant::now(),
        });

        assert_eq!(
            collector.states(),
            vec![
                PipelineState::Init,
                PipelineState::Decomposed,
                PipelineState::Failed
            ]
        );
        assert_eq!(collector.get_stats().state_transitions, 2);
    }

    #[test]
    fn test_recent_events() {
        let collector = TelemetryCollector::new();
        for attempt in 1..=5 {
            collector.record(TelemetryEvent::RetryAttempt {
                operation: "search".to_string(),
                attempt,
                timestamp: Instant::now(),
            });
        }

        assert_eq!(collector.recent_events(3).len(), 3);
        assert_eq!(collector.get_stats().retry_attempts, 5);
    }

    fn transition(collector: &TelemetryCollector, from: PipelineState, to: PipelineState) {
        collector.record(TelemetryEvent::StateTransition {
            from,
            to,
            timestamp: Instant::now(),
        });
    }

    #[test]
    fn test_runs_are_kept_apart() {
        let collector = TelemetryCollector::new();
        let first = collector.for_run(Uuid::new_v4());
        let second = collector.for_run(Uuid::new_v4());

        transition(&first, PipelineState::Init, PipelineState::Decomposed);
        transition(&second, PipelineState::Init, PipelineState::Decomposed);
        transition(&first, PipelineState::Decomposed, PipelineState::Failed);
        second.record(TelemetryEvent::HopStarted {
            index: 1,
            timestamp: Instant::now(),
        });

        assert_eq!(
            collector.states_for(first.run_id().unwrap()),
            vec![
                PipelineState::Init,
                PipelineState::Decomposed,
                PipelineState::Failed
            ]
        );
        assert_eq!(
            second.states(),
            vec![PipelineState::Init, PipelineState::Decomposed]
        );
        assert!(first.started_hops().is_empty());
        assert_eq!(second.started_hops(), vec![1]);

        // Unscoped view follows the most recently active run
        assert_eq!(collector.started_hops(), vec![1]);
        assert_eq!(
            collector.run_ids(),
            vec![first.run_id().unwrap(), second.run_id().unwrap()]
        );
        assert_eq!(collector.get_stats().state_transitions, 3);
    }

    #[test]
    fn test_event_log_is_bounded() {
        let collector = TelemetryCollector::with_capacity(4);
        for attempt in 1..=10 {
            collector.record(TelemetryEvent::RetryAttempt {
                operation: "search".to_string(),
                attempt,
                timestamp: Instant::now(),
            });
        }

        assert_eq!(collector.event_count(), 4);
        assert_eq!(collector.get_stats().retry_attempts, 10);
        match &collector.recent_events(4)[0] {
            TelemetryEvent::RetryAttempt { attempt, .. } => assert_eq!(*attempt, 7),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
