use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

use crate::api::response::{Ack, ApiError};
use crate::telegram::Update;
use crate::AppState;

/// Receive one Telegram update.
/// Route: POST /webhook/:token
///
/// The token is checked before the body is even parsed.
pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    if token != state.config.bot.token {
        tracing::warn!("Rejected webhook call with invalid token");
        return Err(ApiError::forbidden("Invalid token"));
    }

    let update: Update = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid update payload: {e}")))?;

    let outcome = state
        .dispatcher
        .handle_update(&update)
        .await
        .map_err(|e| {
            tracing::error!(update_id = update.update_id, error = %e, "Failed to process update");
            ApiError::internal("Failed to process update")
        })?;

    tracing::debug!(update_id = update.update_id, outcome = ?outcome, "Handled update");
    Ok(Ack::ok())
}
