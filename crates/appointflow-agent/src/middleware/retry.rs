use std::time::Duration;

use tracing::{error, warn};

use appointflow_core::config::RetryConfig;
use appointflow_core::error::Result;
use appointflow_core::types::{RunContext, STEP_FAILURE_FALLBACK};

use super::{Middleware, Next};

/// Re-runs a failing step from the snapshot it was first given.
///
/// Attempt `n` (zero-based) that fails waits `backoff_ms * 2^n` before the
/// next one. When every attempt has failed the run escalates with a safe
/// message and a `step_error:<kind>` trace entry; the error never escapes.
#[derive(Debug, Clone)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay after the failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.config.backoff_ms.saturating_mul(factor))
    }
}

impl Middleware for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn call(&self, mut ctx: RunContext, next: Next<'_>) -> Result<RunContext> {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;
        loop {
            let err = match next.run(ctx.clone()) {
                Ok(out) => return Ok(out),
                Err(e) => e,
            };

            if attempt >= max_retries {
                error!(
                    run_id = %ctx.run_id(),
                    step = next.step_id().as_str(),
                    attempts = attempt + 1,
                    error = %err,
                    "Step failed after retries"
                );
                ctx.escalate(STEP_FAILURE_FALLBACK, format!("step_error:{}", err.kind()));
                return Ok(ctx);
            }

            let delay = self.backoff(attempt);
            warn!(
                run_id = %ctx.run_id(),
                step = next.step_id().as_str(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Step failed, retrying"
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            attempt += 1;
        }
    }
}
