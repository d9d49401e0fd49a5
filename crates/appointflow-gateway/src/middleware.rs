use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use crate::auth::{self, Principal};
use crate::state::AppState;

/// Extractor that validates authentication via Bearer header or query params.
pub struct Authenticated(pub Principal);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        let query = parts.uri.query().unwrap_or("");
        let query_token = auth::extract_token_from_query(query);

        let result = auth::validate_auth(&state.config.gateway, bearer, query_token);

        async move {
            match result {
                Some(principal) => Ok(Authenticated(principal)),
                None => Err(StatusCode::UNAUTHORIZED),
            }
        }
    }
}
