//! Exponential backoff for reconnect attempts against a single agent.

use crate::error::{is_retryable_error, AgentPlaneError, AgentPlaneResult};
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
        }
    }
}

pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn execute<F, Fut, T>(&self, mut f: F) -> AgentPlaneResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = AgentPlaneResult<T>>,
    {
        let mut last_error = None;
        let mut delay_ms = self.config.initial_delay_ms;

        for attempt in 0..=self.config.max_retries {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e.clone());

                    if !is_retryable_error(&e) {
                        return Err(e);
                    }
                    if attempt >= self.config.max_retries {
                        return Err(AgentPlaneError::InternalError(format!(
                            "max retries ({}) exceeded, last error: {e}",
                            self.config.max_retries
                        )));
                    }

                    sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = ((delay_ms as f64) * self.config.multiplier) as u64;
                    delay_ms = delay_ms.min(self.config.max_delay_ms);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AgentPlaneError::InternalError("retry loop exited without error".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        });
        let attempts = AtomicU32::new(0);

        let result = executor
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AgentPlaneError::NetworkError("connection reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let attempts = AtomicU32::new(0);

        let result: AgentPlaneResult<()> = executor
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentPlaneError::ValidationError("bad payload".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
