//! Retry manager with exponential backoff
//!
//! Every attempt of an external call is bounded by a timeout. Transient
//! failures (timeouts, unavailable services) are retried with binary
//! exponential backoff and ±25% jitter, up to a fixed number of attempts.

use crate::config::RetryConfig;
use crate::errors::ServiceError;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

/// Maximum number of attempts per call
pub const MAX_ATTEMPTS: u32 = 4;

/// Base delay for exponential backoff (500ms)
const BASE_DELAY_MS: u64 = 500;

/// Maximum delay cap (8 seconds)
const MAX_DELAY_MS: u64 = 8000;

/// Per-attempt time bound (60 seconds)
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry manager with exponential backoff
#[derive(Clone)]
pub struct RetryManager {
    /// Total attempts, including the first
    max_attempts: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,

    /// Time bound for a single attempt
    call_timeout: Duration,

    telemetry: Option<TelemetryCollector>,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryManager")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("enable_jitter", &self.enable_jitter)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
            call_timeout: CALL_TIMEOUT,
            telemetry: None,
        }
    }

    /// Create retry manager from pipeline configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            enable_jitter: config.jitter,
            call_timeout: config.call_timeout(),
            telemetry: None,
        }
    }

    /// Create retry manager with custom attempt count and base delay
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            ..Self::new()
        }
    }

    /// Override the per-attempt time bound
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Report retries and timeouts to a collector
    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Execute operation with timeout and retry logic
    ///
    /// Returns the first success, the first non-retryable error, or
    /// [`ServiceError::Exhausted`] carrying the last transient error.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match timeout(self.call_timeout, operation()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_) => {
                    let timeout_ms = self.call_timeout.as_millis() as u64;
                    self.record(TelemetryEvent::CallTimedOut {
                        operation: operation_name.to_string(),
                        timeout_ms,
                        timestamp: Instant::now(),
                    });
                    ServiceError::Timeout {
                        duration_ms: timeout_ms,
                    }
                }
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= self.max_attempts {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "retries exhausted"
                );
                return Err(ServiceError::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.calculate_delay(attempt);
            tracing::debug!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient failure"
            );
            self.record(TelemetryEvent::RetryAttempt {
                operation: operation_name.to_string(),
                attempt,
                timestamp: Instant::now(),
            });
            sleep(delay).await;
        }
    }

    fn record(&self, event: TelemetryEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(event);
        }
    }

    /// Calculate delay for given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        // Binary exponential backoff: 2^attempt
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));

        // Cap at maximum delay
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // Add jitter if enabled (±25% random variation)
        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on backoff time spent sleeping across all retries
    pub fn max_total_backoff(&self) -> Duration {
        let total_ms: u64 = (1..self.max_attempts)
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt))
                    .min(self.max_delay_ms)
            })
            .sum();

        Duration::from_millis(total_ms)
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get per-attempt time bound
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}
