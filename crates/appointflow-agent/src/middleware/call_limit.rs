use tracing::warn;

use appointflow_core::error::Result;
use appointflow_core::types::{RunContext, CALL_LIMIT_FALLBACK};

use super::{Middleware, Next};

/// Caps step invocations per run.
///
/// Every pass through this layer counts one call, including passes that end
/// up short-circuited. Once the count exceeds the ceiling the step is skipped
/// and the run escalates.
#[derive(Debug, Clone)]
pub struct CallLimit {
    max_step_calls: u32,
}

impl CallLimit {
    pub fn new(max_step_calls: u32) -> Self {
        Self { max_step_calls }
    }

    pub fn max_step_calls(&self) -> u32 {
        self.max_step_calls
    }
}

impl Middleware for CallLimit {
    fn name(&self) -> &'static str {
        "call_limit"
    }

    fn call(&self, mut ctx: RunContext, next: Next<'_>) -> Result<RunContext> {
        let calls = ctx.record_step_call();
        if calls > self.max_step_calls {
            warn!(
                run_id = %ctx.run_id(),
                step = next.step_id().as_str(),
                calls,
                max = self.max_step_calls,
                "Step call limit exceeded"
            );
            ctx.escalate(CALL_LIMIT_FALLBACK, "call_limit_exceeded");
            return Ok(ctx);
        }
        next.run(ctx)
    }
}
