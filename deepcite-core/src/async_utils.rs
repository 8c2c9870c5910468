//! Async utilities and patterns
//!
//! Provides retry logic, timeouts and bounded concurrency for external calls

use crate::error::{DeepciteError, DeepciteResult, ErrorContext};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Only recoverable errors (network, timeout, rate limit) are retried; any
/// other error is returned immediately.
pub async fn retry_async<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> DeepciteResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeepciteResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) if !error.is_recoverable() => return Err(error),
            Err(error) => {
                if attempt >= max_attempts {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                    return Err(error);
                }

                // Honour an explicit retry-after hint when the service sent one
                let base_delay = match &error {
                    DeepciteError::RateLimit {
                        retry_after_ms: Some(hint),
                        ..
                    } => (*hint).max(delay),
                    _ => delay,
                };

                let actual_delay = if config.jitter {
                    let jitter_factor = 0.1;
                    let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
                    ((base_delay as f64) * (1.0 + jitter)) as u64
                } else {
                    base_delay
                };

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    delay_ms = actual_delay,
                    "Operation failed, retrying"
                );

                sleep(Duration::from_millis(actual_delay)).await;

                delay = ((delay as f64) * config.backoff_multiplier) as u64;
                delay = delay.min(config.max_delay_ms);
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> DeepciteResult<T>
where
    F: Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DeepciteError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity")
                .with_suggestion("Verify service availability"),
        }),
    }
}

/// Concurrent processing with controlled parallelism.
///
/// Results are returned in input order.
pub async fn process_concurrently<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    processor: F,
) -> Vec<DeepciteResult<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = DeepciteResult<R>> + Send + 'static,
{
    use futures::stream::{self, StreamExt};

    stream::iter(items)
        .map(|item| {
            let processor = processor.clone();
            tokio::spawn(async move { processor(item).await })
        })
        .buffered(max_concurrent.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|join_result| match join_result {
            Ok(result) => result,
            Err(join_error) => Err(DeepciteError::Internal {
                message: format!("Task join error: {}", join_error),
                source: Some(Box::new(join_error)),
                context: ErrorContext::new("async_utils")
                    .with_operation("process_concurrently")
                    .with_suggestion("Check for panics in concurrent tasks"),
            }),
        })
        .collect()
}
