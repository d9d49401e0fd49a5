//! Step registry: the `Step` trait and the seven steps of the triage flow.

pub mod review;
pub mod triage;

use appointflow_core::error::Result;
use appointflow_core::types::RunContext;

use crate::graph::StepId;

pub use review::{HumanReview, PauseForReview, ReviewDecision, Reviewer};

/// A named transformation over the run context.
///
/// Steps take the context by value and hand it back, so a failed attempt can
/// be discarded and retried from an untouched snapshot. A step appends at least
/// one trace entry, the first being its own name, and never assumes any
/// middleware is present.
pub trait Step: Send + Sync {
    fn id(&self) -> StepId;

    fn run(&self, ctx: RunContext) -> Result<RunContext>;
}

/// A step backed by a plain function.
pub struct FnStep {
    id: StepId,
    f: fn(RunContext) -> Result<RunContext>,
}

impl FnStep {
    pub fn new(id: StepId, f: fn(RunContext) -> Result<RunContext>) -> Self {
        Self { id, f }
    }
}

impl Step for FnStep {
    fn id(&self) -> StepId {
        self.id
    }

    fn run(&self, ctx: RunContext) -> Result<RunContext> {
        (self.f)(ctx)
    }
}
