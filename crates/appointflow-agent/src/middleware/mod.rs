//! Middleware pipeline: cross-cutting wrappers composed around every step.
//!
//! Given layers `[M1, M2, ..., Mn]` and a step `S`, invocation runs
//! `M1(M2(...Mn(S)))`: the first layer sees the call first and the result
//! last, the last layer sits closest to the raw step. Each layer hands off
//! through [`Next`], and may skip the handoff entirely to short-circuit.
//!
//! [`Pipeline::invoke`] never fails: an error escaping the outermost layer is
//! normalized into an ESCALATE outcome.

pub mod call_limit;
pub mod redact;
pub mod retry;

use std::sync::Arc;

use tracing::warn;

use appointflow_core::config::EngineConfig;
use appointflow_core::error::Result;
use appointflow_core::types::{RunContext, STEP_FAILURE_FALLBACK};

use crate::graph::StepId;
use crate::steps::Step;

pub use call_limit::CallLimit;
pub use redact::Redact;
pub use retry::Retry;

/// A wrapper around step invocation.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle one invocation. Call `next.run(ctx)` to continue inward.
    fn call(&self, ctx: RunContext, next: Next<'_>) -> Result<RunContext>;
}

/// The remainder of the pipeline below the current layer.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    step: &'a dyn Step,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// The step this chain ends in.
    pub fn step_id(&self) -> StepId {
        self.step.id()
    }

    pub fn run(self, ctx: RunContext) -> Result<RunContext> {
        match self.rest.split_first() {
            Some((layer, rest)) => layer.call(
                ctx,
                Next {
                    step: self.step,
                    rest,
                },
            ),
            None => self.step.run(ctx),
        }
    }
}

/// Ordered middleware stack shared by every node of a graph.
#[derive(Clone, Default)]
pub struct Pipeline {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Layers listed outermost first.
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self { layers }
    }

    /// Call limit, then retry, then redaction.
    pub fn standard(config: &EngineConfig) -> Self {
        Self::new(vec![
            Arc::new(CallLimit::new(config.max_step_calls)),
            Arc::new(Retry::new(config.retry.clone())),
            Arc::new(Redact),
        ])
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Run `step` through every layer. Always returns a context.
    pub fn invoke(&self, step: &dyn Step, ctx: RunContext) -> RunContext {
        let snapshot = ctx.clone();
        let next = Next {
            step,
            rest: &self.layers,
        };
        match next.run(ctx) {
            Ok(out) => out,
            Err(e) => {
                warn!(
                    run_id = %snapshot.run_id(),
                    step = step.id().as_str(),
                    error = %e,
                    "Step failure escaped the pipeline"
                );
                let mut ctx = snapshot;
                ctx.escalate(STEP_FAILURE_FALLBACK, format!("step_error:{}", e.kind()));
                ctx
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("layers", &self.layer_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appointflow_core::error::AppointflowError;
    use appointflow_core::types::TerminalStatus;

    /// Records entry and exit in the trace.
    struct Recorder(&'static str);

    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.0
        }

        fn call(&self, mut ctx: RunContext, next: Next<'_>) -> Result<RunContext> {
            ctx.trace(format!("enter:{}", self.0));
            let mut out = next.run(ctx)?;
            out.trace(format!("exit:{}", self.0));
            Ok(out)
        }
    }

    struct Echo;

    impl Step for Echo {
        fn id(&self) -> StepId {
            StepId::Classify
        }

        fn run(&self, mut ctx: RunContext) -> Result<RunContext> {
            ctx.trace("step");
            Ok(ctx)
        }
    }

    struct Broken;

    impl Step for Broken {
        fn id(&self) -> StepId {
            StepId::Draft
        }

        fn run(&self, _ctx: RunContext) -> Result<RunContext> {
            Err(AppointflowError::StepFailed {
                step: "draft".into(),
                message: "nope".into(),
            })
        }
    }

    fn trace_of(pipeline: &Pipeline) -> Vec<String> {
        pipeline
            .invoke(&Echo, RunContext::new("x"))
            .route_trace()
            .to_vec()
    }

    #[test]
    fn first_layer_is_outermost() {
        let pipeline = Pipeline::new(vec![Arc::new(Recorder("a")), Arc::new(Recorder("b"))]);
        assert_eq!(
            trace_of(&pipeline),
            vec!["enter:a", "enter:b", "step", "exit:b", "exit:a"]
        );
    }

    #[test]
    fn swapping_layers_swaps_order() {
        let pipeline = Pipeline::new(vec![Arc::new(Recorder("b")), Arc::new(Recorder("a"))]);
        assert_eq!(
            trace_of(&pipeline),
            vec!["enter:b", "enter:a", "step", "exit:a", "exit:b"]
        );
    }

    #[test]
    fn empty_pipeline_runs_step() {
        assert_eq!(trace_of(&Pipeline::default()), vec!["step"]);
    }

    #[test]
    fn escaped_error_becomes_escalate() {
        let pipeline = Pipeline::new(vec![Arc::new(Recorder("a"))]);
        let out = pipeline.invoke(&Broken, RunContext::new("x"));
        assert_eq!(out.terminal_status, Some(TerminalStatus::Escalate));
        assert_eq!(out.final_response.as_deref(), Some(STEP_FAILURE_FALLBACK));
        assert_eq!(out.route_trace(), &["step_error:step_failed".to_string()]);
    }

    #[test]
    fn standard_order() {
        let pipeline = Pipeline::standard(&EngineConfig::default());
        assert_eq!(pipeline.layer_names(), vec!["call_limit", "retry", "redact"]);
    }
}
