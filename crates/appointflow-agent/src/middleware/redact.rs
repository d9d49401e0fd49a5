use serde_json::Value;

use appointflow_core::error::Result;
use appointflow_core::redact::{mask_pii, DEBUG_META_KEY};
use appointflow_core::types::RunContext;

use super::{Middleware, Next};

/// Masks identifiers in `meta["debug"]` after the step returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redact;

impl Middleware for Redact {
    fn name(&self) -> &'static str {
        "redact"
    }

    fn call(&self, ctx: RunContext, next: Next<'_>) -> Result<RunContext> {
        let mut out = next.run(ctx)?;
        if let Some(Value::String(debug)) = out.meta.get_mut(DEBUG_META_KEY) {
            *debug = mask_pii(debug);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::StepId;
    use crate::middleware::Pipeline;
    use crate::steps::FnStep;

    fn leak_debug(mut ctx: RunContext) -> Result<RunContext> {
        ctx.trace("handle_intent");
        ctx.set_meta_str(DEBUG_META_KEY, "looked up appointment id: 1234 for 5551234");
        ctx.set_meta_str("note", "appointment id: 1234");
        Ok(ctx)
    }

    #[test]
    fn masks_debug_only() {
        let pipeline = Pipeline::new(vec![Arc::new(Redact)]);
        let step = FnStep::new(StepId::HandleIntent, leak_debug);
        let out = pipeline.invoke(&step, RunContext::new("x"));
        assert_eq!(
            out.meta_str(DEBUG_META_KEY),
            Some("looked up appointment id: *** for ***")
        );
        assert_eq!(out.meta_str("note"), Some("appointment id: 1234"));
    }

    #[test]
    fn missing_debug_is_fine() {
        let pipeline = Pipeline::new(vec![Arc::new(Redact)]);
        let step = FnStep::new(StepId::Draft, |mut ctx| {
            ctx.trace("draft");
            Ok(ctx)
        });
        let out = pipeline.invoke(&step, RunContext::new("x"));
        assert!(out.meta.get(DEBUG_META_KEY).is_none());
    }
}
