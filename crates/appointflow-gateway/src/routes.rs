use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use appointflow_agent::{
    after_pause, apply_review, resolve_alternative, PauseOutcome, ReviewDecision, Stage,
};
use appointflow_core::types::{
    RunContext, APPOINTMENT_ID_KEY, INSURANCE_ID_KEY, MODEL_PROVIDER_KEY,
};

use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::state::AppState;
use crate::view::RunView;

const MISSING_IDS: &str = "Please enter BOTH appointment ID and insurance card number.";
const MISSING_INPUT: &str = "Please enter your request.";

// GET /api/health, no auth required
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
pub struct CreateRunBody {
    #[serde(default)]
    pub appointment_id: String,
    #[serde(default)]
    pub insurance_id: String,
    #[serde(default)]
    pub user_input: String,
}

// POST /api/runs
pub async fn create_run(
    Authenticated(principal): Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRunBody>,
) -> Result<(StatusCode, Json<RunView>), ApiError> {
    let appointment_id = body.appointment_id.trim();
    let insurance_id = body.insurance_id.trim();
    let user_input = body.user_input.trim();

    if appointment_id.is_empty() || insurance_id.is_empty() {
        return Err(ApiError::BadRequest(MISSING_IDS.to_string()));
    }
    if user_input.is_empty() {
        return Err(ApiError::BadRequest(MISSING_INPUT.to_string()));
    }

    let mut ctx = RunContext::with_intake(user_input, appointment_id, insurance_id);
    ctx.set_meta_str(MODEL_PROVIDER_KEY, state.model_provider.as_str());
    let ctx = state.coordinator.pause(ctx, Stage::Confirm)?;

    info!(run_id = %ctx.run_id(), caller = principal.as_str(), "Run created");
    Ok((StatusCode::CREATED, Json(RunView::from(&ctx))))
}

// GET /api/runs/{id}
pub async fn get_run(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunView>, ApiError> {
    let _guard = state.coordinator.lock_run(&id).await?;
    let ctx = state.coordinator.load(&id)?;
    Ok(Json(RunView::from(&ctx)))
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub proceed: bool,
}

// POST /api/runs/{id}/confirm
pub async fn confirm(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _guard = state.coordinator.lock_run(&id).await?;
    let ctx = state.coordinator.load_at(&id, Stage::Confirm)?;

    if !body.proceed {
        state.coordinator.finish(&id)?;
        info!(run_id = %id, "Run declined at confirmation");
        return Ok(Json(serde_json::json!({
            "run_id": id,
            "declined": true,
            "prefill": {
                "appointment_id": ctx.meta_str(APPOINTMENT_ID_KEY),
                "insurance_id": ctx.meta_str(INSURANCE_ID_KEY),
                "user_input": ctx.input(),
            },
        })));
    }

    let executor = state.executor.clone();
    let slots = state.config.slots.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let ctx = executor.run(ctx);
        after_pause(&executor, ctx, &slots)
    })
    .await??;

    let label = outcome_label(&outcome);
    if outcome.is_terminal() {
        state.coordinator.finish(&id)?;
    } else {
        state.coordinator.save(outcome.context())?;
    }
    info!(run_id = %id, outcome = label, "Run walked");

    Ok(Json(serde_json::json!({
        "outcome": label,
        "run": RunView::from(outcome.context()),
    })))
}

fn outcome_label(outcome: &PauseOutcome) -> &'static str {
    match outcome {
        PauseOutcome::Ended(_) => "ended",
        PauseOutcome::Completed(_) => "completed",
        PauseOutcome::AwaitingSlot(_) => "awaiting_slot",
        PauseOutcome::AwaitingReview(_) => "awaiting_review",
    }
}

#[derive(Deserialize)]
pub struct SlotBody {
    pub accept: bool,
}

// POST /api/runs/{id}/slot
pub async fn slot(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SlotBody>,
) -> Result<Json<RunView>, ApiError> {
    let _guard = state.coordinator.lock_run(&id).await?;
    let ctx = state.coordinator.load_at(&id, Stage::Slot)?;

    let accept = body.accept;
    let executor = state.executor.clone();
    let ctx = tokio::task::spawn_blocking(move || resolve_alternative(&executor, ctx, accept))
        .await??;

    state.coordinator.finish(&id)?;
    info!(run_id = %id, accept, "Alternative slot answered");
    Ok(Json(RunView::from(&ctx)))
}

#[derive(Deserialize)]
pub struct ReviewBody {
    pub action: String,
    #[serde(default)]
    pub edited_text: Option<String>,
}

impl ReviewBody {
    fn decision(self) -> Result<ReviewDecision, ApiError> {
        match self.action.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(ReviewDecision::Approve),
            "edit" => Ok(ReviewDecision::Edit(self.edited_text.unwrap_or_default())),
            other => Err(ApiError::BadRequest(format!(
                "Unknown review action '{other}', expected 'approve' or 'edit'."
            ))),
        }
    }
}

// POST /api/runs/{id}/review
pub async fn review(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<RunView>, ApiError> {
    let decision = body.decision()?;

    let _guard = state.coordinator.lock_run(&id).await?;
    let ctx = state.coordinator.load_at(&id, Stage::Review)?;

    let executor = state.executor.clone();
    let ctx = tokio::task::spawn_blocking(move || apply_review(&executor, ctx, decision))
        .await??;

    state.coordinator.finish(&id)?;
    info!(run_id = %id, "Review applied");
    Ok(Json(RunView::from(&ctx)))
}
