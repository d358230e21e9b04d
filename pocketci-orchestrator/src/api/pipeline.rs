//! Pipeline claim/completion handlers

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use pocketci_core::dto::ClaimRequest;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::dispatch::DispatchError;

/// POST /pipelines/claim
///
/// Hands the next eligible run to the requesting runner, or 204 when the
/// queue has nothing for it.
pub async fn claim_pipeline(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Response {
    match state.orchestrator.dispatcher.claim(&req.runner_name) {
        Some(run) => {
            info!(
                "pipeline {} claimed by runner {}",
                run.name, req.runner_name
            );
            (StatusCode::OK, Json(run)).into_response()
        }
        None => {
            debug!("no pipelines for runner {}", req.runner_name);
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// POST /pipelines/{id}
///
/// Marks a claimed run as done.
pub async fn pipeline_done(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .dispatcher
        .complete(id)
        .map_err(|err| match err {
            DispatchError::NotFound(id) => ApiError::NotFound(format!("pipeline {id} not found")),
        })?;

    info!("pipeline {id} is done");
    Ok(StatusCode::NO_CONTENT)
}
