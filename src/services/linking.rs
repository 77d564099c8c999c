// SPDX-License-Identifier: MIT

//! OAuth linking: the pending-handshake table and the orchestrator.
//!
//! A handshake starts in chat (`/start`), goes out of band through the
//! user's browser, and comes back on the `/strava_callback` redirect. The
//! `state` nonce is the CSRF binding between the redirect and the chat user
//! who initiated it: unguessable, single-use, and expiring.

use crate::db::Database;
use crate::error::AppError;
use crate::services::strava::StravaService;
use crate::services::telegram::ReplySink;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

/// 256 bits of state entropy (spec floor is 128).
const STATE_BYTES: usize = 32;

/// Handshakes not completed within this window are swept.
pub const PENDING_LINK_TTL_SECS: i64 = 10 * 60;

/// Scopes requested from Strava.
const OAUTH_SCOPES: &str = "read,activity:read_all,profile:read_all";

const AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";

/// A live handshake awaiting the provider redirect.
#[derive(Debug, Clone)]
struct PendingLink {
    user_id: i64,
    created_at: i64,
}

/// In-memory table of live handshakes, keyed by `state`.
///
/// Deliberately not persisted: a lost entry only costs the user another
/// /start, and the TTL bounds the table size.
pub struct PendingLinks {
    entries: DashMap<String, PendingLink>,
    rng: SystemRandom,
}

impl Default for PendingLinks {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingLinks {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            rng: SystemRandom::new(),
        }
    }

    /// Allocate a fresh state for a user's handshake.
    pub fn issue(&self, user_id: i64) -> Result<String, AppError> {
        let mut bytes = [0u8; STATE_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG failure")))?;

        let state = URL_SAFE_NO_PAD.encode(bytes);
        self.entries.insert(
            state.clone(),
            PendingLink {
                user_id,
                created_at: chrono::Utc::now().timestamp(),
            },
        );

        Ok(state)
    }

    /// Atomically consume a state, returning the user who issued it.
    /// A second consume of the same state returns None.
    pub fn consume(&self, state: &str) -> Option<i64> {
        self.entries.remove(state).map(|(_, entry)| entry.user_id)
    }

    /// Drop handshakes older than the TTL. Returns how many were removed.
    pub fn sweep(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.created_at < PENDING_LINK_TTL_SECS);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Linking orchestrator: issues authorization URLs and completes the
/// code-for-token exchange when the redirect arrives.
#[derive(Clone)]
pub struct LinkService {
    pending: Arc<PendingLinks>,
    strava: StravaService,
    db: Database,
    sink: Arc<dyn ReplySink>,
    client_id: String,
    redirect_uri: String,
}

impl LinkService {
    pub fn new(
        pending: Arc<PendingLinks>,
        strava: StravaService,
        db: Database,
        sink: Arc<dyn ReplySink>,
        client_id: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            pending,
            strava,
            db,
            sink,
            client_id,
            redirect_uri,
        }
    }

    /// Start a handshake: allocate a state and build the authorize URL the
    /// user will open in their browser.
    pub fn begin_link(&self, user_id: i64) -> Result<String, AppError> {
        let state = self.pending.issue(user_id)?;

        let url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            AUTHORIZE_URL,
            self.client_id,
            urlencoding::encode(&self.redirect_uri),
            OAUTH_SCOPES,
            state
        );

        tracing::info!(user_id, "OAuth handshake started");
        Ok(url)
    }

    /// Complete a handshake from the provider redirect.
    ///
    /// The state is consumed before anything else: an unknown or replayed
    /// state fails with `StateMismatch` and has no side effects.
    pub async fn complete_link(&self, code: &str, state: &str) -> Result<(), AppError> {
        let user_id = self.pending.consume(state).ok_or(AppError::StateMismatch)?;
        self.exchange_and_bind(code, user_id).await
    }

    /// Legacy in-band variant: the auth code arrives as callback-query data
    /// instead of a redirect, so the chat user is already known.
    pub async fn complete_link_for_user(&self, code: &str, user_id: i64) -> Result<(), AppError> {
        self.exchange_and_bind(code, user_id).await
    }

    /// Exchange the code, bind tokens to the user, and tell them how it went.
    async fn exchange_and_bind(&self, code: &str, user_id: i64) -> Result<(), AppError> {
        let grant = match self.strava.client().exchange_code(code).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Token exchange failed");
                self.notify(user_id, "Authorization failed. Use /start to try again.")
                    .await;
                return Err(e);
            }
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

        tracing::info!(user_id, "User linked to Strava");

        // Enrich the success message with the athlete's name when we can get
        // it; the link is already stored either way.
        let text = match self.strava.client().athlete(&grant.access_token).await {
            Ok(athlete) => format!(
                "Authorization succeeded! Linked Strava profile: {} {}",
                athlete.firstname, athlete.lastname
            ),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Athlete profile fetch failed after linking");
                "Authorization succeeded! Your Strava account is now linked.".to_string()
            }
        };

        self.notify(user_id, &text).await;
        Ok(())
    }

    async fn notify(&self, user_id: i64, text: &str) {
        if let Err(e) = self.sink.send_text(user_id, text, &[]).await {
            tracing::warn!(user_id, error = %e, "Failed to deliver linking notification");
        }
    }
}
