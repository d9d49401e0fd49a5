use serde::Serialize;

use appointflow_agent::resume::{REQUESTED_SLOT_KEY, SUGGESTED_SLOT_KEY};
use appointflow_agent::Stage;
use appointflow_core::redact::{mask_id, mask_pii};
use appointflow_core::types::{
    Intent, RunContext, TerminalStatus, APPOINTMENT_ID_KEY, INSURANCE_ID_KEY,
};

/// Characters of an id left visible in responses.
const VISIBLE_ID_CHARS: usize = 3;

/// What the gateway shows of a run. Ids and the request text are masked.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run_id: String,
    pub awaiting: Option<&'static str>,
    pub intent: Option<Intent>,
    pub terminal_status: Option<TerminalStatus>,
    pub user_input: String,
    pub appointment_id: Option<String>,
    pub insurance_id: Option<String>,
    pub draft_response: Option<String>,
    pub final_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_slot: Option<String>,
    pub route_trace: Vec<String>,
}

impl From<&RunContext> for RunView {
    fn from(ctx: &RunContext) -> Self {
        let masked = |key: &str| ctx.meta_str(key).map(|v| mask_id(v, VISIBLE_ID_CHARS));
        let plain = |key: &str| ctx.meta_str(key).map(str::to_string);
        Self {
            run_id: ctx.run_id().to_string(),
            awaiting: Stage::of(ctx).map(|s| s.as_str()),
            intent: ctx.intent,
            terminal_status: ctx.terminal_status,
            user_input: mask_pii(ctx.input()),
            appointment_id: masked(APPOINTMENT_ID_KEY),
            insurance_id: masked(INSURANCE_ID_KEY),
            draft_response: ctx.draft_response.clone(),
            final_response: ctx.final_response.clone(),
            requested_slot: plain(REQUESTED_SLOT_KEY),
            suggested_slot: plain(SUGGESTED_SLOT_KEY),
            route_trace: ctx.route_trace().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_input_are_masked() {
        let ctx = RunContext::with_intake("cancel appointment 98765", "A12345", "INS-777");
        let view = RunView::from(&ctx);
        assert_eq!(view.appointment_id.as_deref(), Some("***345"));
        assert_eq!(view.insurance_id.as_deref(), Some("****777"));
        assert!(!view.user_input.contains("98765"));
        assert!(view.awaiting.is_none());
    }

    #[test]
    fn slots_skipped_when_absent() {
        let ctx = RunContext::new("reschedule");
        let json = serde_json::to_value(RunView::from(&ctx)).unwrap();
        assert!(json.get("suggested_slot").is_none());
        assert!(json["appointment_id"].is_null());
    }

    #[test]
    fn awaiting_stage_shown() {
        let mut ctx = RunContext::new("reschedule appointment 1234 to 2pm");
        Stage::Slot.mark(&mut ctx);
        ctx.set_meta_str(SUGGESTED_SLOT_KEY, "3:00pm");
        let view = RunView::from(&ctx);
        assert_eq!(view.awaiting, Some("slot"));
        assert_eq!(view.suggested_slot.as_deref(), Some("3:00pm"));
    }
}
