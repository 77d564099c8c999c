// SPDX-License-Identifier: MIT

//! Strava OAuth redirect route.

use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/strava_callback", get(oauth_callback))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth redirect endpoint: completes the handshake and shows the user a
/// short page telling them to return to chat.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<&'static str> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        return Err(AppError::InvalidCode);
    }

    // A redirect without a state cannot be correlated with any handshake
    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::StateMismatch);
    };

    state.links.complete_link(&code, &oauth_state).await?;

    Ok("Authorization succeeded, return to chat")
}
