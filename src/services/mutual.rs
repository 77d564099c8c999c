// SPDX-License-Identifier: MIT

//! Mutual-like detection and notification.
//!
//! A pair of users qualifies as "mutual" once they have liked at least one
//! common activity. Each qualifying pair is notified exactly once; the
//! delivered set lives in the `mutual_notified` table with canonical
//! ordering, and its check-and-insert is atomic, so re-likes and concurrent
//! likes cannot double-notify.

use crate::db::Database;
use crate::error::AppError;
use crate::services::strava::StravaService;
use crate::services::telegram::ReplySink;
use std::sync::Arc;

/// Minimum number of shared liked activities for a pair to qualify.
/// Kept as a named threshold so product can tune it without touching the
/// detection logic.
const MUTUAL_THRESHOLD: i64 = 1;

/// Detects mutual likes on every new like and notifies both sides.
#[derive(Clone)]
pub struct MutualLikeService {
    db: Database,
    strava: StravaService,
    sink: Arc<dyn ReplySink>,
}

impl MutualLikeService {
    pub fn new(db: Database, strava: StravaService, sink: Arc<dyn ReplySink>) -> Self {
        Self { db, strava, sink }
    }

    /// Run detection after a like on `activity_id` by `user_id`.
    ///
    /// Notification failures are logged and never roll back the like.
    pub async fn on_new_like(&self, user_id: i64, activity_id: i64) -> Result<(), AppError> {
        let peers = self.db.others_who_liked(activity_id, user_id).await?;

        for peer in peers {
            let shared = self.db.shared_activity_count(user_id, peer).await?;
            if shared < MUTUAL_THRESHOLD {
                continue;
            }

            if !self.db.try_mark_mutual_notified(user_id, peer).await? {
                // Pair already notified earlier
                continue;
            }

            tracing::info!(user_id, peer, shared, "Mutual like detected");
            self.notify_side(user_id, peer).await;
            self.notify_side(peer, user_id).await;
        }

        Ok(())
    }

    /// Tell `recipient` about their mutual like with `counterpart`.
    ///
    /// The counterpart's Strava profile makes the message useful; when it
    /// cannot be fetched (no link, revoked tokens) a degraded message still
    /// goes out.
    async fn notify_side(&self, recipient: i64, counterpart: i64) {
        let text = match self.strava.athlete_for(counterpart).await {
            Ok(athlete) => format!(
                "You have a mutual like with {} {}! Profile: {}",
                athlete.firstname,
                athlete.lastname,
                athlete.profile_url()
            ),
            Err(e) => {
                tracing::warn!(
                    recipient,
                    counterpart,
                    error = %e,
                    "Could not fetch counterpart profile for mutual-like message"
                );
                "You have a mutual like!".to_string()
            }
        };

        if let Err(e) = self.sink.send_text(recipient, &text, &[]).await {
            tracing::warn!(recipient, error = %e, "Failed to deliver mutual-like message");
        }
    }
}
