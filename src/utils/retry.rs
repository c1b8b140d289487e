//! Bounded retry with exponential backoff for calls to external services.
//!
//! Every RPC, indexer, market-data and swap-router call goes through
//! [`RetryPolicy::run`]. Transient faults (timeouts, connection errors, rate
//! limits) are retried; permanent faults return immediately.

use std::{future::Future, time::Duration};

use log::{error, warn};

use crate::{
    config::RetrySettings,
    error::{Fault, WalletError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls made before giving up, first attempt included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Per-attempt deadline; an elapsed deadline counts as a transient fault
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or the attempt budget is spent.
    ///
    /// `operation` names the call in logs and in the returned error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, WalletError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Fault>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_fault = Fault::transient("no attempt made");

        for attempt in 0..attempts {
            let fault = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(fault)) => fault,
                Err(_) => Fault::transient(format!("timed out after {:?}", self.call_timeout)),
            };

            if !fault.is_transient() {
                return Err(WalletError::UpstreamRejected {
                    operation: operation.to_string(),
                    message: fault.message().to_string(),
                });
            }

            if attempt + 1 < attempts {
                let delay = self.backoff(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation,
                    attempt + 1,
                    attempts,
                    fault.message(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            last_fault = fault;
        }

        error!(
            "{} failed after {} attempt(s): {}",
            operation,
            attempts,
            last_fault.message()
        );

        Err(WalletError::UpstreamUnavailable {
            operation: operation.to_string(),
            attempts,
            message: last_fault.message().to_string(),
        })
    }
}
