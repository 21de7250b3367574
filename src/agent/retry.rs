//! Bounded retry over transient engine failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::engine::EngineResult;
use crate::error::{EngineFailure, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempt `attempt` (0-based), doubling each time.
    fn delay_for(&self, attempt: u32) -> Duration {
        self.delay * 2u32.saturating_pow(attempt)
    }
}

/// Run the engine call, re-attempting when it reports a failure whose error
/// matches a transient signature. Non-transient failures and hard errors
/// are returned verbatim.
pub async fn execute_with_retry<F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<EngineResult>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<EngineResult>>,
{
    let mut attempt = 0;
    loop {
        let result = op().await?;
        if result.success {
            return Ok(result);
        }

        let Some(error) = result.error.as_deref() else {
            return Ok(result);
        };

        let failure = EngineFailure::from_message(error);
        if !failure.is_transient() || attempt >= policy.max_retries {
            return Ok(result);
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_secs = delay.as_secs(),
            error,
            "Transient engine failure, retrying"
        );
        sleep(delay).await;
    }
}
