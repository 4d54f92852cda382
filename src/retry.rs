//! Retry manager for handling transient failures with backoff
//!
//! Used by the connection pool to ride out short database outages. The
//! backoff is exponential in general; a multiplier of 1.0 gives a fixed delay.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry manager with configurable backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
    operation: &'static str,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            operation: "operation",
        }
    }

    /// Name used in log lines for failed attempts
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    /// Execute an async operation with retry logic
    ///
    /// The operation runs at most `max_attempts` times. Non-retryable errors
    /// are returned immediately. Every failed attempt is logged with its
    /// ordinal.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!(
                        operation = self.operation,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Attempt failed"
                    );

                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= max_attempts {
                        warn!(
                            operation = self.operation,
                            attempts = attempt,
                            "Max attempts exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.calculate_backoff(attempt - 1);
                    debug!(
                        operation = self.operation,
                        next_attempt = attempt + 1,
                        backoff_ms = backoff.as_millis(),
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate backoff duration for a given retry number (0-based)
    ///
    /// Uses initial_backoff * multiplier^retry, capped at max_backoff_secs,
    /// with optional jitter.
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let base = self.config.initial_backoff_secs as f64
            * self.config.backoff_multiplier.powi(retry as i32);
        let capped = base.min(self.config.max_backoff_secs as f64);

        let delay = if self.config.jitter {
            // 50-100% of the calculated backoff
            let jitter = rand::thread_rng().gen_range(0.5..1.0);
            capped * jitter
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
