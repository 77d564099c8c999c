// SPDX-License-Identifier: MIT

//! Persisted user link model.

use sqlx::FromRow;

/// One Telegram user's binding to a Strava account.
///
/// At most one row per `user_id`. Inserted by the linking orchestrator,
/// rewritten by token refresh, and marked stale (never deleted) when Strava
/// rejects the refresh token.
#[derive(Debug, Clone, FromRow)]
pub struct UserLink {
    /// Telegram chat/user ID
    pub user_id: i64,
    /// Current OAuth access token (opaque)
    pub access_token: String,
    /// Current OAuth refresh token (opaque)
    pub refresh_token: String,
    /// Access token expiry, unix seconds
    pub expires_at: i64,
    /// Set when the refresh token was rejected; kept for audit
    pub stale: bool,
}

impl UserLink {
    /// Whether the access token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at - now < margin_secs
    }
}
