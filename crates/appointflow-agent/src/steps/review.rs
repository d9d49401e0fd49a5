use std::sync::Arc;

use tracing::info;

use appointflow_core::error::Result;
use appointflow_core::types::{RunContext, TerminalStatus};

use super::Step;
use crate::graph::StepId;
use crate::resume::Stage;

/// What a reviewer did with a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    /// Replacement text. Blank text falls back to the draft.
    Edit(String),
}

/// Synchronous source of review decisions, e.g. a terminal prompt.
pub trait Reviewer: Send + Sync {
    fn review(&self, ctx: &RunContext, draft: &str) -> Result<ReviewDecision>;
}

/// Write the reviewed text into `final_response` and trace the decision.
pub fn apply_decision(ctx: &mut RunContext, decision: ReviewDecision) {
    let draft = ctx.draft_response.clone().unwrap_or_default();
    match decision {
        ReviewDecision::Approve => {
            ctx.final_response = Some(draft);
            ctx.trace("hitl_approve");
        }
        ReviewDecision::Edit(text) => {
            let text = text.trim();
            ctx.final_response = Some(if text.is_empty() {
                draft
            } else {
                text.to_string()
            });
            ctx.trace("hitl_edit");
        }
    }
}

/// Blocking review: asks the reviewer inline and completes the run.
pub struct HumanReview {
    reviewer: Arc<dyn Reviewer>,
}

impl HumanReview {
    pub fn new(reviewer: Arc<dyn Reviewer>) -> Self {
        Self { reviewer }
    }
}

impl Step for HumanReview {
    fn id(&self) -> StepId {
        StepId::HumanReview
    }

    fn run(&self, mut ctx: RunContext) -> Result<RunContext> {
        ctx.trace(StepId::HumanReview.as_str());
        let draft = ctx.draft_response.clone().unwrap_or_default();
        let decision = self.reviewer.review(&ctx, &draft)?;
        info!(run_id = %ctx.run_id(), approved = decision == ReviewDecision::Approve, "Draft reviewed");
        apply_decision(&mut ctx, decision);
        ctx.terminal_status = Some(TerminalStatus::Ready);
        ctx.trace("hitl_completed");
        Ok(ctx)
    }
}

/// Pause-mode review: marks the run as waiting for an out-of-band decision.
#[derive(Debug, Default)]
pub struct PauseForReview;

impl Step for PauseForReview {
    fn id(&self) -> StepId {
        StepId::HumanReview
    }

    fn run(&self, mut ctx: RunContext) -> Result<RunContext> {
        ctx.trace(StepId::HumanReview.as_str());
        ctx.trace("hitl_pause");
        Stage::Review.mark(&mut ctx);
        Ok(ctx)
    }
}
