//! Per-call timeout and bounded retry around any [`LlmClient`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use switchboard_core::config::LlmConfig;
use switchboard_core::errors::ProviderError;

use super::{GenerationContext, LlmClient};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Adds up to 25% random jitter to each delay.
    pub add_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_backoff_ms),
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let clamped = base.min(self.max_delay.as_millis() as f64);

        let delay = if self.add_jitter {
            clamped + clamped * 0.25 * rand::thread_rng().gen_range(0.0..1.0)
        } else {
            clamped
        };

        Duration::from_millis(delay as u64)
    }
}

/// Wraps a client with a timeout on every attempt and retries retryable failures.
pub struct ResilientClient {
    inner: Arc<dyn LlmClient>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ResilientClient {
    pub fn new(inner: Arc<dyn LlmClient>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self { inner, timeout, retry }
    }

    pub fn from_config(inner: Arc<dyn LlmClient>, config: &LlmConfig) -> Self {
        Self::new(inner, Duration::from_secs(config.timeout_secs), RetryPolicy::from_config(config))
    }

    async fn attempt(
        &self,
        prompt: &str,
        context: Option<&GenerationContext>,
    ) -> Result<String, ProviderError> {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.inner.generate(prompt, context)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl LlmClient for ResilientClient {
    async fn generate(
        &self,
        prompt: &str,
        context: Option<&GenerationContext>,
    ) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.attempt(prompt, context).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        event_name = "provider.retry_scheduled",
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "provider.call_failed",
                        attempts = attempt + 1,
                        error = %error,
                        "provider call failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}
