// SPDX-License-Identifier: MIT

//! Command router: dispatches inbound Telegram updates to the domain flows.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{CallbackQuery, Message, Update};
use crate::services::linking::LinkService;
use crate::services::mutual::MutualLikeService;
use crate::services::strava::StravaService;
use crate::services::telegram::{Button, ReplySink};
use std::sync::Arc;

/// How many recent activities /activities shows.
const RECENT_ACTIVITIES: u32 = 5;

/// At most this many photos are forwarded per activity.
const MAX_PHOTOS_PER_ACTIVITY: usize = 3;

/// Callback-data prefix for like buttons.
const LIKE_PREFIX: &str = "like_";

/// Routes commands and callback-button events to handlers.
#[derive(Clone)]
pub struct CommandRouter {
    db: Database,
    strava: StravaService,
    links: LinkService,
    mutual: MutualLikeService,
    sink: Arc<dyn ReplySink>,
}

impl CommandRouter {
    pub fn new(
        db: Database,
        strava: StravaService,
        links: LinkService,
        mutual: MutualLikeService,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            db,
            strava,
            links,
            mutual,
            sink,
        }
    }

    /// Dispatch one inbound update.
    pub async fn handle_update(&self, update: Update) -> Result<(), AppError> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }

        tracing::debug!(update_id = update.update_id, "Ignoring update without content");
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<(), AppError> {
        let user_id = message.chat.id;
        let Some(text) = message.text.as_deref() else {
            tracing::debug!(user_id, "Ignoring non-text message");
            return Ok(());
        };

        match parse_command(text) {
            Some("/start") => self.handle_start(user_id).await,
            Some("/activities") => self.handle_activities(user_id).await,
            _ => {
                self.sink
                    .send_text(user_id, "Sorry, I did not understand that. Try /start or /activities.", &[])
                    .await
            }
        }
    }

    /// `/start`: begin the OAuth handshake and hand out the authorize URL.
    async fn handle_start(&self, user_id: i64) -> Result<(), AppError> {
        let auth_url = self.links.begin_link(user_id)?;

        self.sink
            .send_text(
                user_id,
                "Press the button below to connect your Strava account:",
                &[Button::url("Connect Strava", auth_url)],
            )
            .await
    }

    /// `/activities`: the user's 5 most recent activities, each with a like
    /// button and up to three photos.
    async fn handle_activities(&self, user_id: i64) -> Result<(), AppError> {
        let activities = match self.strava.activities_for(user_id, RECENT_ACTIVITIES).await {
            Ok(activities) => activities,
            Err(e) => {
                self.sink.send_text(user_id, reply_for_error(&e), &[]).await?;
                return Err(e);
            }
        };

        if activities.is_empty() {
            return self
                .sink
                .send_text(user_id, "No recent activities found.", &[])
                .await;
        }

        for activity in activities {
            self.sink
                .send_text(
                    user_id,
                    &activity.summary(),
                    &[Button::callback("❤ Like", format!("{}{}", LIKE_PREFIX, activity.id))],
                )
                .await?;

            // Photos are best-effort decoration; a failure here must not
            // abort the remaining activities.
            match self.strava.photos_for(user_id, activity.id).await {
                Ok(photos) => {
                    let urls = photos
                        .iter()
                        .filter_map(|p| p.preferred_url())
                        .take(MAX_PHOTOS_PER_ACTIVITY);
                    for url in urls {
                        if let Err(e) = self.sink.send_photo(user_id, url).await {
                            tracing::warn!(user_id, activity_id = activity.id, error = %e, "Photo send failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id, activity_id = activity.id, error = %e, "Photo fetch failed");
                }
            }
        }

        Ok(())
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<(), AppError> {
        let user_id = callback.from.id;
        let Some(data) = callback.data.as_deref() else {
            return self.sink.acknowledge_callback(&callback.id, None).await;
        };

        if let Some(activity_id) = parse_like_payload(data) {
            return self.handle_like(user_id, activity_id, &callback.id).await;
        }

        if is_legacy_auth_code(data) {
            // Legacy path: some clients deliver the OAuth code in-band as
            // callback data instead of going through the redirect.
            self.sink.acknowledge_callback(&callback.id, None).await?;
            if let Err(e) = self.links.complete_link_for_user(data, user_id).await {
                tracing::warn!(user_id, error = %e, "In-band code exchange failed");
            }
            return Ok(());
        }

        tracing::debug!(user_id, data, "Ignoring unknown callback payload");
        self.sink.acknowledge_callback(&callback.id, None).await
    }

    /// Record a like and run mutual detection.
    async fn handle_like(
        &self,
        user_id: i64,
        activity_id: i64,
        callback_id: &str,
    ) -> Result<(), AppError> {
        let newly_liked = self.db.add_like(user_id, activity_id).await?;

        let toast = if newly_liked { "Liked ❤" } else { "Already liked" };
        if let Err(e) = self
            .sink
            .acknowledge_callback(callback_id, Some(toast))
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to acknowledge like callback");
        }

        // Detection runs on repeats too: the notified-pair set makes it
        // idempotent, and a repeat can complete a pair whose earlier
        // notification attempt failed midway.
        self.mutual.on_new_like(user_id, activity_id).await
    }
}

/// Extract the command token from a message, tolerating arguments and the
/// `/cmd@botname` form Telegram uses in group chats.
fn parse_command(text: &str) -> Option<&str> {
    let first = text.trim().split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    Some(first.split('@').next().unwrap_or(first))
}

/// `like_<activity_id>` callback payload.
fn parse_like_payload(data: &str) -> Option<i64> {
    data.strip_prefix(LIKE_PREFIX)?.parse().ok()
}

/// Exactly 40 lowercase hex characters, the shape of a Strava auth code.
fn is_legacy_auth_code(data: &str) -> bool {
    data.len() == 40
        && data
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Fixed user-facing replies for activities-flow failures.
fn reply_for_error(e: &AppError) -> &'static str {
    match e {
        AppError::NotLinked => "You are not linked yet — use /start to link first.",
        AppError::Unauthorized => "Your Strava link is no longer valid, please relink with /start.",
        AppError::Transport(_) => "Temporary error, try again.",
        _ => "Internal error.",
    }
}
