use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use appointflow_core::error::AppointflowError;

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Run(#[from] AppointflowError),

    #[error("engine task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Run(AppointflowError::RunNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Run(AppointflowError::RunConflict { .. }) => StatusCode::CONFLICT,
            Self::Run(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Run(AppointflowError::RunNotFound(_)) => json!({
                "error": "This request has expired or was already completed. Please start again.",
                "restart": true,
            }),
            Self::Run(AppointflowError::RunConflict { .. }) | Self::BadRequest(_) => json!({
                "error": self.to_string(),
            }),
            _ => {
                error!(error = %self, "Request failed");
                json!({ "error": "Internal error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AppointflowError::RunNotFound("r1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AppointflowError::RunConflict {
                run_id: "r1".into(),
                expected: "slot".into(),
                actual: "review".into(),
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AppointflowError::Store("poisoned".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
