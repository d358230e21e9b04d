//! Webhook endpoint handler
//!
//! Accepts GitHub webhook deliveries on any path. The signature is verified
//! before anything touches the body; valid deliveries are answered with
//! 202 Accepted and processed asynchronously. Webhook senders treat the
//! protocol as best-effort, so per-event processing failures only get
//! logged — they never fail the HTTP exchange retroactively.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use pocketci_core::domain::event::{GITHUB_VENDOR, Webhook};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::vcs::github;

/// Header carrying the GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header carrying the HMAC-SHA1 payload signature.
const HEADER_SIGNATURE: &str = "x-hub-signature";

/// POST on any path — webhook intake.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    // Verify before parsing: unauthenticated requests get no further work.
    if !github::verify_signature(&body, signature, &state.webhook_secret) {
        warn!("webhook rejected: invalid signature");
        return Err(ApiError::Unauthorized);
    }

    let event_type = headers
        .get(HEADER_EVENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("missing required header: {HEADER_EVENT}")))?;

    debug!("received {event_type} webhook ({} bytes)", body.len());

    let webhook = Webhook {
        vendor: GITHUB_VENDOR.to_string(),
        event_type,
        payload: body.to_vec(),
    };

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(err) = orchestrator.handle(webhook).await {
            warn!("failed to handle webhook: {err}");
        }
    });

    Ok(StatusCode::ACCEPTED)
}
