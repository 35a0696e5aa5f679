//! Bounded retry with exponential backoff for model invocations.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy applied to each row's model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt; 0 disables retrying.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Execute an async model operation, retrying transient failures with
/// exponential backoff up to the configured attempt cap.
///
/// `ModelError::RateLimited` backs off by at least the server-provided
/// retry-after. Permanent errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, ModelError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt == config.max_retries {
                    return Err(err);
                }
                let backoff_ms = backoff_for(config, attempt, &err);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms,
                    error = %err,
                    "retrying model call after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Backoff delay for a given attempt, respecting rate-limit hints.
fn backoff_for(config: &RetryConfig, attempt: u32, err: &ModelError) -> u64 {
    let computed = exponential_backoff(config, attempt);
    if let ModelError::RateLimited { retry_after_secs } = err {
        computed.max(retry_after_secs * 1000)
    } else {
        computed
    }
}

/// Pure exponential backoff with optional jitter.
fn exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% jitter, seeded from the clock to avoid a rand dependency.
        let jitter = (capped as f64 * 0.25 * clock_fraction()) as u64;
        capped + jitter
    } else {
        capped
    }
}

fn clock_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
