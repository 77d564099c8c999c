// SPDX-License-Identifier: MIT

//! SQLite-backed persistent store.
//!
//! One database file holds the three relations the bot needs:
//! - `users`: OAuth token bindings, one row per Telegram user
//! - `likes`: directed (user, activity) interest signals, insert-only
//! - `mutual_notified`: canonically ordered pairs already notified of a
//!   mutual like
//!
//! Pending OAuth handshakes are deliberately *not* here; they are short-lived
//! and live in memory (see `services::linking`).

use crate::error::AppError;
use crate::models::UserLink;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    stale INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS likes (
    user_id INTEGER NOT NULL,
    activity_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, activity_id)
);

CREATE INDEX IF NOT EXISTS likes_activity_idx ON likes(activity_id);

CREATE TABLE IF NOT EXISTS mutual_notified (
    user_a INTEGER NOT NULL,
    user_b INTEGER NOT NULL,
    PRIMARY KEY (user_a, user_b),
    CHECK (user_a < user_b)
);
"#;

/// Database client (WAL-mode SQLite behind a connection pool).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at the given path and run the schema.
    pub async fn new(path: &str) -> Result<Self, AppError> {
        // A pooled `:memory:` database would give each connection its own
        // empty database, so tests get a single-connection pool.
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite://{}?mode=rwc", path), 5)
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| AppError::Store(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self, AppError> {
        Self::new(":memory:").await
    }

    // ─── Token Store ─────────────────────────────────────────────

    /// Get the UserLink for a Telegram user.
    pub async fn get_link(&self, user_id: i64) -> Result<Option<UserLink>, AppError> {
        let link = sqlx::query_as::<_, UserLink>(
            "SELECT user_id, access_token, refresh_token, expires_at, stale
             FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    /// Insert or replace a user's tokens. Clears the stale flag, so a
    /// successful relink revives a previously invalidated binding.
    pub async fn put_link(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (user_id, access_token, refresh_token, expires_at, stale)
             VALUES (?, ?, ?, ?, 0)
             ON CONFLICT(user_id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 expires_at = excluded.expires_at,
                 stale = 0",
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a user's link stale after Strava rejected the refresh token.
    /// The row is kept for audit; the user must relink via /start.
    pub async fn mark_link_stale(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET stale = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ─── Like Store ──────────────────────────────────────────────

    /// Record a like. Returns true when the row is new; a repeat like is a
    /// silent success.
    pub async fn add_like(&self, user_id: i64, activity_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("INSERT OR IGNORE INTO likes (user_id, activity_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(activity_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Users other than `user_id` who liked the given activity.
    pub async fn others_who_liked(
        &self,
        activity_id: i64,
        user_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        let rows = sqlx::query("SELECT user_id FROM likes WHERE activity_id = ? AND user_id != ?")
            .bind(activity_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    /// Number of distinct activities both users have liked.
    pub async fn shared_activity_count(&self, user_a: i64, user_b: i64) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM likes a
             JOIN likes b ON a.activity_id = b.activity_id
             WHERE a.user_id = ? AND b.user_id = ?",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>(0))
    }

    // ─── Mutual-Notified Set ─────────────────────────────────────

    /// Atomically record that the pair has been notified of their mutual
    /// like. Returns true on first insertion, false if the pair was already
    /// notified. The pair is stored in canonical (min, max) order, so the
    /// caller may pass the users either way around.
    pub async fn try_mark_mutual_notified(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<bool, AppError> {
        let (lo, hi) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        let result =
            sqlx::query("INSERT OR IGNORE INTO mutual_notified (user_a, user_b) VALUES (?, ?)")
                .bind(lo)
                .bind(hi)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
