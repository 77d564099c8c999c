// SPDX-License-Identifier: MIT

//! Application error types with consistent HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Application error type.
///
/// Covers both inbound HTTP surfaces (Telegram webhook, OAuth redirect) and
/// outbound provider failures. The OAuth redirect endpoint renders these as
/// short plain-text pages, so `IntoResponse` produces text rather than JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Network-level failure or retryable 5xx from Strava/Telegram.
    #[error("transport error: {0}")]
    Transport(String),

    /// The OAuth authorization code was rejected during token exchange.
    #[error("authorization code rejected")]
    InvalidCode,

    /// Strava rejected the access or refresh token; the user must relink.
    #[error("provider rejected credentials")]
    Unauthorized,

    /// OAuth callback carried an unknown or already-consumed `state`.
    #[error("state mismatch")]
    StateMismatch,

    /// An authenticated operation was requested by a user with no UserLink.
    #[error("user is not linked")]
    NotLinked,

    /// Persistence failure; aborts the current request only.
    #[error("store error: {0}")]
    Store(String),

    /// Resource missing upstream (e.g. photos for an activity).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::StateMismatch => (StatusCode::BAD_REQUEST, "state mismatch"),
            AppError::InvalidCode => (StatusCode::BAD_REQUEST, "authorization failed"),
            AppError::Transport(msg) => {
                tracing::warn!(error = %msg, "Transport error");
                (StatusCode::BAD_GATEWAY, "authorization failed")
            }
            AppError::Unauthorized => (StatusCode::BAD_REQUEST, "authorization failed"),
            AppError::NotLinked => (StatusCode::BAD_REQUEST, "use /start to link first"),
            AppError::NotFound(msg) => {
                tracing::debug!(resource = %msg, "Not found");
                (StatusCode::NOT_FOUND, "not found")
            }
            AppError::Store(msg) => {
                tracing::error!(error = %msg, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
