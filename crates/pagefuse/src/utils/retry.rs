//! Call gate for external capabilities.
//!
//! Every detection, recognition, table and vision call goes through one
//! [`CapabilityGate`]: a semaphore bounds how many calls are in flight across
//! all pages, each attempt runs under a timeout, and retryable failures are
//! retried with bounded exponential backoff.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::core::config::RetryConfig;
use crate::error::{CapabilityError, CapabilityKind, CapabilityResult};

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Always at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.max_attempts.saturating_sub(1) as usize
    }

    /// Delays: `initial_backoff * multiplier^n`, capped at `max_backoff`.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff.max(self.initial_backoff))
            .with_factor(self.multiplier.max(1.0) as f32)
            .with_max_times(self.max_retries())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            multiplier: config.backoff_multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Shared admission gate for capability calls.
#[derive(Debug)]
pub struct CapabilityGate {
    semaphore: Semaphore,
    call_timeout: Duration,
    policy: RetryPolicy,
    attempts: AtomicU64,
    retries: AtomicU64,
}

impl CapabilityGate {
    pub fn new(max_concurrent_calls: usize, call_timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent_calls.max(1)),
            call_timeout,
            policy,
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls started through this gate, retries included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Attempts that were retries of an earlier failure.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Run `op` under the gate.
    ///
    /// `op` is invoked once per attempt. A permit is held only while an
    /// attempt is running, never while backing off. Non-retryable errors and
    /// the last attempt's error are returned as is.
    pub async fn call<T, F, Fut>(&self, capability: CapabilityKind, mut op: F) -> CapabilityResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CapabilityResult<T>>,
    {
        let gate = self;
        let attempt = || {
            let pending = op();
            async move {
                let _permit = gate.semaphore.acquire().await.map_err(|_| CapabilityError::Transient {
                    capability,
                    message: "call gate closed".to_string(),
                })?;

                gate.attempts.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                match timeout(gate.call_timeout, pending).await {
                    Ok(result) => result,
                    Err(_) => Err(CapabilityError::Timeout {
                        capability,
                        elapsed: started.elapsed(),
                    }),
                }
            }
        };

        attempt
            .retry(self.policy.backoff())
            .when(CapabilityError::is_retryable)
            .notify(|error: &CapabilityError, delay: Duration| {
                let retry = gate.retries.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    capability = %capability,
                    retry,
                    max_attempts = gate.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying capability call"
                );
            })
            .await
    }
}
