//! Rule-based content steps: intent, safety, required info, drafting.
//!
//! Every function here is a pure transformation of the context and never
//! fails on its own; failures only come from test doubles or from the
//! reviewer behind `human_review`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use appointflow_core::error::Result;
use appointflow_core::types::{Intent, RunContext, TerminalStatus, APPOINTMENT_ID_KEY};

use crate::graph::StepId;

pub const INTENT_PAYLOAD_KEY: &str = "intent_payload";

const RESCHEDULE_KEYWORDS: &[&str] = &["reschedule", "move my appointment", "change my appointment"];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "call off"];
const PREP_KEYWORDS: &[&str] = &["prep", "prepare", "preparation", "instructions"];

const EMERGENCY_KEYWORDS: &[&str] = &[
    "chest pain",
    "shortness of breath",
    "difficulty breathing",
    "unconscious",
    "severe bleeding",
    "stroke",
    "suicidal",
    "kill myself",
    "overdose",
    "emergency",
];

pub const EMERGENCY_RESPONSE: &str = "Your message suggests a potential emergency. \
     Please call local emergency services immediately or go to the nearest emergency department. \
     If possible, contact the clinic afterward to update your appointment.";

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Keyword match on the lowercased request.
pub fn detect_intent(text: &str) -> Intent {
    let t = text.to_lowercase();
    if contains_any(&t, RESCHEDULE_KEYWORDS) {
        Intent::Reschedule
    } else if contains_any(&t, CANCEL_KEYWORDS) {
        Intent::Cancel
    } else if contains_any(&t, PREP_KEYWORDS) {
        Intent::PrepInfo
    } else {
        Intent::Unknown
    }
}

fn labelled_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:appointment|appt)\s*(?:id)?\s*[:#]?\s*([A-Za-z0-9\-]{3,})\b")
            .expect("labelled id pattern is valid")
    })
}

fn appointment_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:appointment|appt)\b").expect("word pattern is valid"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{3,})\b").expect("digits pattern is valid"))
}

/// Pull an appointment id out of free text.
///
/// A labelled token (`appointment id: AB-12`, `appt #991`) wins; otherwise any
/// run of three or more digits counts once the word appointment/appt appears.
pub fn extract_appointment_id(text: &str) -> Option<String> {
    if let Some(id) = labelled_id_re().captures(text).and_then(|c| c.get(1)) {
        return Some(id.as_str().to_string());
    }
    if appointment_word_re().is_match(text) {
        return digits_re()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
    }
    None
}

pub fn classify_intent(mut ctx: RunContext) -> Result<RunContext> {
    ctx.trace(StepId::Classify.as_str());
    ctx.intent = Some(detect_intent(ctx.input()));
    Ok(ctx)
}

pub fn safety_check(mut ctx: RunContext) -> Result<RunContext> {
    ctx.trace(StepId::SafetyCheck.as_str());
    let text = ctx.input().to_lowercase();
    if contains_any(&text, EMERGENCY_KEYWORDS) {
        ctx.risk_flag = true;
        ctx.escalate(EMERGENCY_RESPONSE, "safety_escalate");
    } else {
        ctx.risk_flag = false;
        ctx.trace("safety_ok");
    }
    Ok(ctx)
}

pub fn info_check(mut ctx: RunContext) -> Result<RunContext> {
    ctx.trace(StepId::InfoCheck.as_str());
    let intent = ctx.intent.unwrap_or(Intent::Unknown);

    let mut missing = Vec::new();
    if intent.needs_appointment_id() {
        let has_id = extract_appointment_id(ctx.input()).is_some()
            || ctx
                .meta_str(APPOINTMENT_ID_KEY)
                .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            missing.push(APPOINTMENT_ID_KEY.to_string());
        }
    }

    if missing.is_empty() {
        ctx.missing_info = missing;
        ctx.trace("info_complete");
        return Ok(ctx);
    }

    ctx.missing_info = missing;
    ctx.terminal_status = Some(TerminalStatus::NeedInfo);
    ctx.final_response = Some(
        match intent {
            Intent::Reschedule => {
                "I can help reschedule. Please provide your appointment ID \
                 (or confirmation number) and your preferred new date/time window."
            }
            Intent::Cancel => {
                "I can help cancel. Please provide your appointment ID (or confirmation number)."
            }
            _ => "Please provide more details so I can assist.",
        }
        .to_string(),
    );
    ctx.trace("need_info");
    Ok(ctx)
}

pub fn handle_intent(mut ctx: RunContext) -> Result<RunContext> {
    ctx.trace(StepId::HandleIntent.as_str());
    let intent = ctx.intent.unwrap_or(Intent::Unknown);
    ctx.set_meta(INTENT_PAYLOAD_KEY, json!({ "action": intent.action() }));
    Ok(ctx)
}

pub fn draft(mut ctx: RunContext) -> Result<RunContext> {
    ctx.trace(StepId::Draft.as_str());
    let text = match ctx.intent.unwrap_or(Intent::Unknown) {
        Intent::Reschedule => {
            "I can help with rescheduling. I've noted your request and will move \
             the appointment to your requested window once confirmed."
        }
        Intent::Cancel => {
            "I can help cancel your appointment. I've recorded the cancellation request."
        }
        Intent::PrepInfo => prep_draft(&ctx.input().to_lowercase()),
        Intent::Unknown => {
            "I can assist with rescheduling, cancellation, or preparation instructions. \
             Which would you like?"
        }
    };
    ctx.draft_response = Some(text.to_string());
    Ok(ctx)
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

fn prep_draft(text: &str) -> &'static str {
    if text.contains("mri") {
        "MRI preparation (general):\n\
         - Tell the clinic if you have any implanted devices or metal in your body.\n\
         - Remove metal objects (jewelry, watches, hairpins) before the scan.\n\
         - You may be asked not to eat or drink for a few hours if contrast is used.\n\
         - Let staff know if you are pregnant, have kidney disease, or feel claustrophobic.\n\
         If you share whether contrast is planned and your appointment time, I can tailor the instructions."
    } else if has_word(text, "ct") || text.contains("cat scan") {
        "CT scan preparation (general):\n\
         - You may be asked not to eat or drink for a few hours before the scan.\n\
         - If contrast is used, tell the clinic about allergies (especially iodine/contrast) and kidney disease.\n\
         - Wear comfortable clothing and remove metal items as instructed.\n\
         If you share whether contrast is planned and your appointment time, I can tailor the instructions."
    } else if text.contains("ultrasound") || text.contains("sonogram") {
        "Ultrasound preparation (general):\n\
         - Preparation depends on the body area being scanned.\n\
         - For some pelvic ultrasounds, you may be asked to drink water and arrive with a full bladder.\n\
         - For some abdominal ultrasounds, you may be asked to avoid eating for several hours.\n\
         Tell me which body area is being scanned and your appointment time, and I'll tailor the instructions."
    } else {
        "Preparation instructions depend on the procedure.\n\
         Please tell me the procedure type (e.g., MRI, CT, ultrasound) and your appointment time, \
         and I'll draft the relevant preparation steps for review."
    }
}

pub fn finalize(mut ctx: RunContext) -> Result<RunContext> {
    if ctx.terminal_status.is_none() {
        ctx.terminal_status = Some(TerminalStatus::Ready);
    }
    ctx.trace(StepId::Finalize.as_str());
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(f: fn(RunContext) -> Result<RunContext>, ctx: RunContext) -> RunContext {
        f(ctx).unwrap()
    }

    #[test]
    fn intent_keywords() {
        assert_eq!(detect_intent("Please RESCHEDULE me"), Intent::Reschedule);
        assert_eq!(detect_intent("can you move my appointment"), Intent::Reschedule);
        assert_eq!(detect_intent("call off tomorrow's visit"), Intent::Cancel);
        assert_eq!(detect_intent("how do I prepare for an MRI"), Intent::PrepInfo);
        assert_eq!(detect_intent("hello there"), Intent::Unknown);
    }

    #[test]
    fn reschedule_wins_over_cancel() {
        assert_eq!(detect_intent("reschedule, don't cancel"), Intent::Reschedule);
    }

    #[test]
    fn appointment_id_extraction() {
        assert_eq!(extract_appointment_id("Cancel appointment ID 1234").as_deref(), Some("1234"));
        assert_eq!(extract_appointment_id("appt #AB-77 please").as_deref(), Some("AB-77"));
        assert_eq!(
            extract_appointment_id("cancel my appointment, id 1234").as_deref(),
            Some("1234")
        );
        assert_eq!(extract_appointment_id("my number is 5551234"), None);
        assert_eq!(extract_appointment_id("reschedule my appointment to 2pm"), None);
    }

    #[test]
    fn safety_escalates_on_emergency() {
        let ctx = run(safety_check, RunContext::new("I have chest pain, cancel my appointment"));
        assert!(ctx.risk_flag);
        assert_eq!(ctx.terminal_status, Some(TerminalStatus::Escalate));
        assert_eq!(ctx.final_response.as_deref(), Some(EMERGENCY_RESPONSE));
        assert_eq!(ctx.route_trace(), &["safety_check", "safety_escalate"]);
    }

    #[test]
    fn safety_passes_plain_request() {
        let ctx = run(safety_check, RunContext::new("cancel appointment 1234"));
        assert!(!ctx.risk_flag);
        assert!(ctx.terminal_status.is_none());
        assert_eq!(ctx.route_trace(), &["safety_check", "safety_ok"]);
    }

    #[test]
    fn info_check_requires_id_for_reschedule() {
        let ctx = run(classify_intent, RunContext::new("I want to reschedule"));
        let ctx = run(info_check, ctx);
        assert_eq!(ctx.terminal_status, Some(TerminalStatus::NeedInfo));
        assert_eq!(ctx.missing_info, vec![APPOINTMENT_ID_KEY.to_string()]);
        assert!(ctx.final_response.as_deref().unwrap().contains("appointment ID"));
        assert_eq!(ctx.route_trace().last().map(String::as_str), Some("need_info"));
    }

    #[test]
    fn info_check_accepts_meta_id() {
        let mut ctx = run(classify_intent, RunContext::new("please cancel"));
        ctx.set_meta_str(APPOINTMENT_ID_KEY, "A-991");
        let ctx = run(info_check, ctx);
        assert!(ctx.terminal_status.is_none());
        assert!(ctx.missing_info.is_empty());
    }

    #[test]
    fn prep_info_needs_nothing() {
        let ctx = run(classify_intent, RunContext::new("prep for my ultrasound"));
        let ctx = run(info_check, ctx);
        assert!(ctx.terminal_status.is_none());
        assert_eq!(ctx.route_trace().last().map(String::as_str), Some("info_complete"));
    }

    #[test]
    fn handle_intent_writes_payload() {
        let ctx = run(classify_intent, RunContext::new("cancel appt 1234"));
        let ctx = run(handle_intent, ctx);
        assert_eq!(ctx.meta[INTENT_PAYLOAD_KEY], json!({"action": "cancel"}));
    }

    #[test]
    fn prep_drafts_are_tailored() {
        let ctx = run(classify_intent, RunContext::new("how do I prepare for my MRI"));
        let ctx = run(draft, ctx);
        assert!(ctx.draft_response.unwrap().starts_with("MRI preparation"));

        let ctx = run(classify_intent, RunContext::new("instructions for a sonogram"));
        let ctx = run(draft, ctx);
        assert!(ctx.draft_response.unwrap().starts_with("Ultrasound preparation"));

        let ctx = run(classify_intent, RunContext::new("prep for a CT scan"));
        let ctx = run(draft, ctx);
        assert!(ctx.draft_response.unwrap().starts_with("CT scan preparation"));
    }

    #[test]
    fn finalize_keeps_existing_status() {
        let mut ctx = RunContext::new("x");
        ctx.terminal_status = Some(TerminalStatus::NeedInfo);
        let ctx = run(finalize, ctx);
        assert_eq!(ctx.terminal_status, Some(TerminalStatus::NeedInfo));

        let ctx = run(finalize, RunContext::new("x"));
        assert_eq!(ctx.terminal_status, Some(TerminalStatus::Ready));
        assert_eq!(ctx.route_trace(), &["finalize"]);
    }

    #[test]
    fn steps_are_repeatable_from_a_snapshot() {
        let steps: [(&str, fn(RunContext) -> Result<RunContext>); 6] = [
            ("classify_intent", classify_intent),
            ("safety_check", safety_check),
            ("info_check", info_check),
            ("handle_intent", handle_intent),
            ("draft", draft),
            ("finalize", finalize),
        ];
        for input in [
            "cancel my appointment, id 1234",
            "reschedule appt 5678 to 2pm",
            "reschedule",
            "how do I prepare for my MRI",
            "chest pain, also need to reschedule",
            "hello there",
        ] {
            let mut snapshot = RunContext::new(input);
            for (name, step) in steps {
                let first = run(step, snapshot.clone());
                let second = run(step, snapshot.clone());
                assert_eq!(first, second, "{name} on {input:?}");
                snapshot = first;
            }
        }
    }
}
