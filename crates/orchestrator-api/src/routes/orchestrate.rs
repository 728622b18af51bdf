//! `POST /orchestrate` and `GET /orchestrate/{id}` (spec §4.8).

use crate::auth::AuthContext;
use crate::dto::{OrchestrateRequest, OrchestrateResponse};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

pub async fn admit(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<OrchestrateRequest>,
) -> Result<(StatusCode, Json<OrchestrateResponse>), ApiError> {
    body.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let admission = state
        .core
        .admit(
            &auth.user_id,
            body.workflow.as_deref(),
            body.data,
            body.correlation_id,
            body.idempotency_key,
        )
        .await?;

    let status = if admission.newly_created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(OrchestrateResponse::from_admission(&admission))))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    _auth: AuthContext,
) -> Result<Json<orchestrator_core::RequestView>, ApiError> {
    let view = state
        .core
        .get_request_view(id)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    Ok(Json(view))
}
