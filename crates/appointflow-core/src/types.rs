use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback shown when a run trips the step-call ceiling.
pub const CALL_LIMIT_FALLBACK: &str = "I'm not able to safely complete that request right now. \
     Please contact the clinic directly for assistance.";

/// Fallback shown when a step keeps failing after its retries.
pub const STEP_FAILURE_FALLBACK: &str = "Something went wrong while processing your request. \
     Please contact the clinic directly.";

/// Fallback shown when the router breaks the forward-progress rule.
pub const ROUTING_FALLBACK: &str = "I'm not able to finish processing that request. \
     Please contact the clinic directly for assistance.";

/// `meta` key for the appointment id supplied at intake.
pub const APPOINTMENT_ID_KEY: &str = "appointment_id";
/// `meta` key for the insurance card number supplied at intake.
pub const INSURANCE_ID_KEY: &str = "insurance_id";
pub const MODEL_PROVIDER_KEY: &str = "model_provider";

/// Unique run identifier: `<UTC seconds>Z_<8 hex>`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S");
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}Z_{}", ts, &suffix[..8]))
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the requester is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Reschedule,
    Cancel,
    PrepInfo,
    Unknown,
}

impl Intent {
    /// Whether handling this intent requires an appointment id.
    pub fn needs_appointment_id(&self) -> bool {
        matches!(self, Self::Reschedule | Self::Cancel)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
            Self::PrepInfo => "prep_info",
            Self::Unknown => "unknown",
        }
    }
}

/// Terminal outcome of a run. Absent while the run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Ready,
    NeedInfo,
    Escalate,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::NeedInfo => "NEED_INFO",
            Self::Escalate => "ESCALATE",
        }
    }

    /// Statuses after which no content-producing step may run.
    pub fn halts(&self) -> bool {
        matches!(self, Self::NeedInfo | Self::Escalate)
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record threaded through every step of one logical request.
///
/// `run_id` and `input` are fixed at construction. `route_trace` only grows,
/// through [`RunContext::trace`]. The step-call counter lives in its own field
/// so it can never collide with keys in `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    run_id: RunId,
    input: String,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub risk_flag: bool,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub draft_response: Option<String>,
    #[serde(default)]
    pub final_response: Option<String>,
    #[serde(default)]
    pub terminal_status: Option<TerminalStatus>,
    #[serde(default)]
    route_trace: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    #[serde(default)]
    step_calls: u32,
}

impl RunContext {
    /// Start a new run with a fresh id.
    pub fn new(input: impl Into<String>) -> Self {
        Self::with_id(RunId::new(), input)
    }

    pub fn with_id(run_id: RunId, input: impl Into<String>) -> Self {
        Self {
            run_id,
            input: input.into(),
            intent: None,
            risk_flag: false,
            missing_info: Vec::new(),
            draft_response: None,
            final_response: None,
            terminal_status: None,
            route_trace: Vec::new(),
            meta: HashMap::new(),
            step_calls: 0,
        }
    }

    /// Start a new run carrying the ids collected at intake in `meta`.
    pub fn with_intake(
        input: impl Into<String>,
        appointment_id: impl Into<String>,
        insurance_id: impl Into<String>,
    ) -> Self {
        let mut ctx = Self::new(input);
        ctx.set_meta_str(APPOINTMENT_ID_KEY, appointment_id);
        ctx.set_meta_str(INSURANCE_ID_KEY, insurance_id);
        ctx
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn route_trace(&self) -> &[String] {
        &self.route_trace
    }

    /// Append one entry to the audit trail.
    pub fn trace(&mut self, entry: impl Into<String>) {
        self.route_trace.push(entry.into());
    }

    pub fn step_calls(&self) -> u32 {
        self.step_calls
    }

    /// Count one step invocation and return the running total.
    pub fn record_step_call(&mut self) -> u32 {
        self.step_calls = self.step_calls.saturating_add(1);
        self.step_calls
    }

    /// True once a status is set that forbids further content steps.
    pub fn is_halted(&self) -> bool {
        self.terminal_status.is_some_and(|s| s.halts())
    }

    /// Terminate the run as ESCALATE with a safe message and a trace marker.
    pub fn escalate(&mut self, message: &str, marker: impl Into<String>) {
        self.terminal_status = Some(TerminalStatus::Escalate);
        self.final_response = Some(message.to_string());
        self.trace(marker);
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.meta.insert(key.into(), value);
    }

    pub fn set_meta_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta
            .insert(key.into(), serde_json::Value::String(value.into()));
    }
}

/// Engine events published on the [`crate::EventBus`].
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Engine invocation started.
    RunStarted { run_id: RunId },
    /// A wrapped step returned.
    StepCompleted {
        run_id: RunId,
        step: String,
        step_calls: u32,
        status: Option<TerminalStatus>,
    },
    /// Engine invocation returned its context.
    RunFinished {
        run_id: RunId,
        status: Option<TerminalStatus>,
        route_trace: Vec<String>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id }
            | Self::StepCompleted { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }
}
