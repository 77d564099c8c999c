// SPDX-License-Identifier: MIT

//! Telegram webhook route.
//!
//! Telegram POSTs every update to `/{bot_token}`; the token in the path is
//! the shared secret. The body is opaque at this layer and handed to the
//! messaging adapter's typed decode.

use crate::models::Update;
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// End-to-end deadline for handling one update. Past it we answer 200 and
/// let the dispatch finish detached (Telegram retries on non-2xx, and a
/// retry of a half-handled update is worse than a late reply).
const WEBHOOK_DEADLINE: Duration = Duration::from_secs(25);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/{token}", post(handle_update))
}

/// Handle one inbound Telegram update (POST).
async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let ok = (StatusCode::OK, Json(json!({ "status": "ok" })));

    // The path segment is the webhook secret
    if token != state.config.telegram_token {
        tracing::warn!("Webhook path token mismatch");
        return (StatusCode::NOT_FOUND, Json(json!({ "status": "not found" })));
    }

    let update: Update = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(e) => {
            // Answer 200 anyway so Telegram does not retry a body we will
            // never be able to parse
            tracing::error!(error = %e, "Failed to decode Telegram update");
            return ok;
        }
    };

    let update_id = update.update_id;
    let commands = state.commands.clone();
    let mut task = tokio::spawn(async move { commands.handle_update(update).await });

    match tokio::time::timeout(WEBHOOK_DEADLINE, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            tracing::warn!(update_id, error = %e, "Update handling failed");
        }
        Ok(Err(join_err)) => {
            tracing::error!(update_id, error = %join_err, "Update handler panicked");
        }
        Err(_) => {
            tracing::info!(update_id, "Webhook deadline hit, finishing detached");
        }
    }

    ok
}
