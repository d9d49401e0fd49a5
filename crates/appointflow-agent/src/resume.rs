//! Continuations for runs that paused outside the engine.
//!
//! A pause-mode graph walk ends at `human_review` without a terminal status.
//! The functions here pick the run up from that point, one per kind of
//! external answer, and each completed path ends by running the wrapped
//! `finalize` step through the executor.

use serde::{Deserialize, Serialize};
use tracing::info;

use appointflow_core::config::SlotsConfig;
use appointflow_core::error::Result;
use appointflow_core::types::{Intent, RunContext, TerminalStatus};

use crate::graph::{GraphExecutor, StepId};
use crate::slots::{check_availability, extract_requested_timeslot, Availability};
use crate::steps::review::{apply_decision, ReviewDecision};

pub const AWAITING_KEY: &str = "awaiting";
pub const SUGGESTED_SLOT_KEY: &str = "suggested_slot";
pub const REQUESTED_SLOT_KEY: &str = "requested_slot";

pub const CANCEL_CONFIRMED: &str = "Your appointment has been cancelled successfully. \
     If you have any other medical needs, please book an appointment.";
pub const RESCHEDULE_CONFIRMED: &str = "Your reschedule request has been completed successfully.";
pub const ALTERNATIVE_DECLINED: &str = "No problem. If that time does not work, I suggest booking \
     a new appointment for a time that better fits your schedule.";
pub const PREP_FOLLOWUP: &str = "\n\nDo you have any other request? \
     Please take a good rest and wish you a smooth and pleasant medical check experience.";

/// The external answer a paused run is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Intake stored, graph not run yet.
    Confirm,
    /// Requested slot taken; alternative offered.
    Slot,
    /// Draft waiting for approve or edit.
    Review,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Slot => "slot",
            Self::Review => "review",
        }
    }

    /// The stage recorded in `meta`, if any.
    pub fn of(ctx: &RunContext) -> Option<Stage> {
        match ctx.meta_str(AWAITING_KEY)? {
            "confirm" => Some(Self::Confirm),
            "slot" => Some(Self::Slot),
            "review" => Some(Self::Review),
            _ => None,
        }
    }

    pub fn mark(self, ctx: &mut RunContext) {
        ctx.set_meta_str(AWAITING_KEY, self.as_str());
    }

    pub fn clear(ctx: &mut RunContext) {
        ctx.meta.remove(AWAITING_KEY);
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run stands after the pause-mode graph walk.
#[derive(Debug, Clone, PartialEq)]
pub enum PauseOutcome {
    /// The walk itself ended the run (NEED_INFO or ESCALATE).
    Ended(RunContext),
    /// Completed without further input.
    Completed(RunContext),
    /// Waiting for the requester to accept or decline an alternative slot.
    AwaitingSlot(RunContext),
    /// Waiting for a reviewer to approve or edit the draft.
    AwaitingReview(RunContext),
}

impl PauseOutcome {
    pub fn context(&self) -> &RunContext {
        match self {
            Self::Ended(ctx)
            | Self::Completed(ctx)
            | Self::AwaitingSlot(ctx)
            | Self::AwaitingReview(ctx) => ctx,
        }
    }

    pub fn into_context(self) -> RunContext {
        match self {
            Self::Ended(ctx)
            | Self::Completed(ctx)
            | Self::AwaitingSlot(ctx)
            | Self::AwaitingReview(ctx) => ctx,
        }
    }

    /// True when the run is over and its stored copy can be dropped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended(_) | Self::Completed(_))
    }
}

fn complete(
    executor: &GraphExecutor,
    mut ctx: RunContext,
    response: impl Into<String>,
    marker: &str,
) -> Result<RunContext> {
    Stage::clear(&mut ctx);
    ctx.final_response = Some(response.into());
    ctx.terminal_status = Some(TerminalStatus::Ready);
    ctx.trace(marker);
    executor.run_step(StepId::Finalize, ctx)
}

/// Decide what a run needs after the pause-mode walk returned.
pub fn after_pause(
    executor: &GraphExecutor,
    mut ctx: RunContext,
    slots: &SlotsConfig,
) -> Result<PauseOutcome> {
    Stage::clear(&mut ctx);

    if ctx.terminal_status.is_some() {
        return Ok(PauseOutcome::Ended(ctx));
    }

    match ctx.intent.unwrap_or(Intent::Unknown) {
        Intent::Cancel => {
            info!(run_id = %ctx.run_id(), "Cancellation confirmed");
            let ctx = complete(executor, ctx, CANCEL_CONFIRMED, "cancel_confirmed")?;
            Ok(PauseOutcome::Completed(ctx))
        }
        Intent::Reschedule => {
            let availability = check_availability(ctx.input(), slots);
            ctx.trace("slot_checked");
            match availability {
                Availability::Available => {
                    let ctx = complete(executor, ctx, RESCHEDULE_CONFIRMED, "reschedule_success")?;
                    Ok(PauseOutcome::Completed(ctx))
                }
                Availability::Unavailable { alternative } => {
                    let requested = extract_requested_timeslot(ctx.input())
                        .unwrap_or_else(|| "your requested time".to_string());
                    info!(
                        run_id = %ctx.run_id(),
                        requested = %requested,
                        alternative = %alternative,
                        "Requested slot unavailable"
                    );
                    ctx.set_meta_str(REQUESTED_SLOT_KEY, requested);
                    ctx.set_meta_str(SUGGESTED_SLOT_KEY, alternative);
                    Stage::Slot.mark(&mut ctx);
                    Ok(PauseOutcome::AwaitingSlot(ctx))
                }
            }
        }
        Intent::PrepInfo | Intent::Unknown => {
            Stage::Review.mark(&mut ctx);
            Ok(PauseOutcome::AwaitingReview(ctx))
        }
    }
}

/// Answer to an offered alternative slot.
pub fn resolve_alternative(
    executor: &GraphExecutor,
    ctx: RunContext,
    accept: bool,
) -> Result<RunContext> {
    if accept {
        let slot = ctx.meta_str(SUGGESTED_SLOT_KEY).unwrap_or_default().to_string();
        let response = format!("Your reschedule request has been completed successfully for {slot}.");
        complete(executor, ctx, response, "reschedule_alt_accepted")
    } else {
        complete(executor, ctx, ALTERNATIVE_DECLINED, "reschedule_alt_declined")
    }
}

/// Apply an out-of-band review decision to a drafted run.
pub fn apply_review(
    executor: &GraphExecutor,
    mut ctx: RunContext,
    decision: ReviewDecision,
) -> Result<RunContext> {
    Stage::clear(&mut ctx);
    apply_decision(&mut ctx, decision);
    ctx.terminal_status = Some(TerminalStatus::Ready);
    ctx.trace("hitl_done");

    if ctx.intent == Some(Intent::PrepInfo) {
        let text = ctx.final_response.get_or_insert_with(String::new);
        text.push_str(PREP_FOLLOWUP);
        ctx.trace("prep_followup_added");
    }

    executor.run_step(StepId::Finalize, ctx)
}
