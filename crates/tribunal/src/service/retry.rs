//! Retry logic for generative service calls.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{GenerativeService, Generation, OutputContract};
use crate::error::ServiceError;

/// Executes an operation with retry logic.
///
/// - Only errors marked retryable by [`ServiceError::is_retryable`] are retried
/// - Waits `retry_delay(attempt) * delay_scale` plus up to 20% jitter between attempts
/// - `max_retries` does not count the first attempt
pub async fn retry_execution<F, Fut, T>(
    max_retries: u32,
    delay_scale: f64,
    operation: F,
) -> Result<T, ServiceError>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ServiceError>> + Send,
    T: Send,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(output) => {
                if attempts > 1 {
                    log::info!(
                        "Generation succeeded on attempt {}/{}",
                        attempts,
                        max_retries + 1
                    );
                }
                return Ok(output);
            }
            Err(e) if e.is_retryable() && attempts <= max_retries => {
                let delay = jittered(e.retry_delay(attempts).mul_f64(delay_scale.max(0.0)));
                log::warn!(
                    "Generation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempts,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!(
                        "Generation failed after {} attempts (max retries exhausted): {}",
                        attempts,
                        e
                    );
                } else {
                    log::error!("Generation failed with non-retryable error: {}", e);
                }
                return Err(e);
            }
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0.0..0.2);
    delay.mul_f64(1.0 + jitter)
}

/// A [`GenerativeService`] decorator that retries transient failures.
///
/// ```rust,ignore
/// let service = RetryingService::new(MyBackend::new(), 2);
/// ```
pub struct RetryingService<S> {
    inner: S,
    max_retries: u32,
    delay_scale: f64,
}

impl<S: GenerativeService> RetryingService<S> {
    pub fn new(inner: S, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            delay_scale: 1.0,
        }
    }

    /// Scales every retry delay. `0.0` disables waiting.
    pub fn with_delay_scale(mut self, scale: f64) -> Self {
        self.delay_scale = scale;
        self
    }
}

#[async_trait]
impl<S: GenerativeService> GenerativeService for RetryingService<S> {
    async fn generate(
        &self,
        prompt: String,
        contract: &OutputContract,
    ) -> Result<Generation, ServiceError> {
        let inner = &self.inner;
        let prompt = &prompt;
        retry_execution(self.max_retries, self.delay_scale, move || {
            inner.generate(prompt.clone(), contract)
        })
        .await
    }

    fn name(&self) -> String {
        format!("Retrying<{}>", self.inner.name())
    }
}
