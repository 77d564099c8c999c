// SPDX-License-Identifier: MIT

//! Strava API client and per-user token lifecycle.
//!
//! Two layers, low to high:
//! - [`StravaClient`]: typed HTTP calls (OAuth token, athlete, activities,
//!   activity photos) with status mapping and bounded retries
//! - [`StravaService`]: token lifecycle on top of the store, with proactive
//!   refresh before expiry, per-user refresh serialization, stale marking
//!   when Strava rejects the refresh token

use crate::db::Database;
use crate::error::AppError;
use crate::models::{Activity, ActivityPhoto, Athlete};
use crate::services::retry::send_with_retry;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Wall-clock timeout for every outbound Strava call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Margin before token expiration when we proactively refresh.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Per-user mutex map used to serialize token refresh.
pub type RefreshLocks = Arc<DashMap<i64, Arc<Mutex<()>>>>;

/// Token grant from the Strava OAuth endpoint.
///
/// Strava normally reports `expires_at` directly; some responses carry only
/// `expires_in`, so both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenGrant {
    /// Absolute expiry in unix seconds, given the current time.
    pub fn expiry(&self, now: i64) -> i64 {
        self.expires_at
            .unwrap_or_else(|| now + self.expires_in.unwrap_or(0))
    }
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_urls(
            client_id,
            client_secret,
            "https://www.strava.com/api/v3".to_string(),
            "https://www.strava.com/oauth/token".to_string(),
        )
    }

    /// Create a client against custom endpoints (tests).
    pub fn with_urls(
        client_id: String,
        client_secret: String,
        base_url: String,
        token_url: String,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url,
            token_url,
            client_id,
            client_secret,
        }
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AppError> {
        let response = send_with_retry(self.http.post(&self.token_url).form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ]))
        .await?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(body = %body, "Strava rejected authorization code");
            return Err(AppError::InvalidCode);
        }

        self.parse_json(response, "token exchange").await
    }

    /// Exchange a refresh token for a new grant.
    ///
    /// A 4xx here means the refresh token is no longer honored (revoked or
    /// superseded); the caller must ask the user to relink.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let response = send_with_retry(self.http.post(&self.token_url).form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]))
        .await?;

        if response.status().is_client_error() {
            return Err(AppError::Unauthorized);
        }

        self.parse_json(response, "token refresh").await
    }

    /// Get the authenticated athlete's profile.
    pub async fn athlete(&self, access_token: &str) -> Result<Athlete, AppError> {
        let url = format!("{}/athlete", self.base_url);
        let response = send_with_retry(self.http.get(&url).bearer_auth(access_token)).await?;
        self.check_json(response, "athlete").await
    }

    /// List the athlete's most recent activities, newest first.
    pub async fn activities(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<Vec<Activity>, AppError> {
        let url = format!("{}/athlete/activities", self.base_url);
        let response = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("per_page", limit.to_string())]),
        )
        .await?;

        self.check_json(response, "activities").await
    }

    /// Photos attached to an activity.
    pub async fn photos(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<Vec<ActivityPhoto>, AppError> {
        let url = format!("{}/activities/{}/photos", self.base_url, activity_id);
        let response = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("size", "600")]),
        )
        .await?;

        self.check_json(response, "photos").await
    }

    /// Map the response status, then parse the JSON body.
    async fn check_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.as_u16() == 401 {
            return Err(AppError::Unauthorized);
        }
        if status.as_u16() == 404 {
            return Err(AppError::NotFound(context.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!(
                "strava {} failed: HTTP {}: {}",
                context, status, body
            )));
        }

        self.parse_json(response, context).await
    }

    async fn parse_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!(
                "strava {} failed: HTTP {}: {}",
                context, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Transport(format!("strava {}: JSON parse error: {}", context, e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - token lifecycle on top of the store
// ─────────────────────────────────────────────────────────────────────────────

/// High-level Strava service that manages token lifecycle and API calls.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    db: Database,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl StravaService {
    pub fn new(client: StravaClient, db: Database) -> Self {
        Self {
            client,
            db,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// Access to the low-level client (token exchange during linking).
    pub fn client(&self) -> &StravaClient {
        &self.client
    }

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// Refresh is serialized per user: concurrent requests wait on the same
    /// lock, and the post-lock re-read means only the first of them actually
    /// calls Strava.
    pub async fn valid_access_token(&self, user_id: i64) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();

        let link = self.require_link(user_id).await?;
        if !link.expires_within(now, TOKEN_REFRESH_MARGIN_SECS) {
            return Ok(link.access_token);
        }

        let lock = self.refresh_lock(user_id);
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: another task may have refreshed
        // while we were waiting.
        let link = self.require_link(user_id).await?;
        if !link.expires_within(now, TOKEN_REFRESH_MARGIN_SECS) {
            return Ok(link.access_token);
        }

        self.refresh_locked(user_id, &link.refresh_token).await
    }

    /// Force a refresh regardless of expiry (after a 401 on an authenticated
    /// call). Serialized with the proactive path via the same per-user lock.
    async fn force_refresh(&self, user_id: i64) -> Result<String, AppError> {
        let lock = self.refresh_lock(user_id);
        let _guard = lock.lock().await;

        let link = self.require_link(user_id).await?;
        self.refresh_locked(user_id, &link.refresh_token).await
    }

    /// Refresh and persist; caller must hold the per-user lock.
    async fn refresh_locked(&self, user_id: i64, refresh_token: &str) -> Result<String, AppError> {
        tracing::info!(user_id, "Access token expiring, refreshing");

        let grant = match self.client.refresh(refresh_token).await {
            Ok(grant) => grant,
            Err(AppError::Unauthorized) => {
                tracing::warn!(user_id, "Refresh token rejected, marking link stale");
                self.db.mark_link_stale(user_id).await?;
                return Err(AppError::Unauthorized);
            }
            Err(e) => return Err(e),
        };

        let now = chrono::Utc::now().timestamp();
        self.db
            .put_link(
                user_id,
                &grant.access_token,
                &grant.refresh_token,
                grant.expiry(now),
            )
            .await?;

        tracing::info!(user_id, "Token refreshed");
        Ok(grant.access_token)
    }

    fn refresh_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load the user's link; absent or stale both surface as NotLinked.
    async fn require_link(&self, user_id: i64) -> Result<crate::models::UserLink, AppError> {
        match self.db.get_link(user_id).await? {
            Some(link) if !link.stale => Ok(link),
            _ => Err(AppError::NotLinked),
        }
    }

    // ─── Authenticated wrappers ──────────────────────────────────

    /// The user's most recent activities, newest first.
    pub async fn activities_for(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Activity>, AppError> {
        self.authenticated(user_id, |token| {
            let client = self.client.clone();
            async move { client.activities(&token, limit).await }
        })
        .await
    }

    /// Photos for one of the user's activities. A missing photo set is an
    /// empty list.
    pub async fn photos_for(
        &self,
        user_id: i64,
        activity_id: u64,
    ) -> Result<Vec<ActivityPhoto>, AppError> {
        let result = self
            .authenticated(user_id, |token| {
                let client = self.client.clone();
                async move { client.photos(&token, activity_id).await }
            })
            .await;

        match result {
            Err(AppError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// The user's own athlete profile.
    pub async fn athlete_for(&self, user_id: i64) -> Result<Athlete, AppError> {
        self.authenticated(user_id, |token| {
            let client = self.client.clone();
            async move { client.athlete(&token).await }
        })
        .await
    }

    /// Run an authenticated call; on a 401, refresh once and retry once.
    /// A second 401 marks the link stale.
    async fn authenticated<T, F, Fut>(&self, user_id: i64, call: F) -> Result<T, AppError>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let token = self.valid_access_token(user_id).await?;

        match call(token).await {
            Err(AppError::Unauthorized) => {
                tracing::info!(user_id, "Access token rejected mid-life, forcing refresh");
                let token = self.force_refresh(user_id).await?;
                match call(token).await {
                    Err(AppError::Unauthorized) => {
                        self.db.mark_link_stale(user_id).await?;
                        Err(AppError::Unauthorized)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}
