// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (also the secret webhook path segment)
    pub telegram_token: String,
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Public base URL for the Telegram webhook and the OAuth redirect
    pub webhook_url: String,
    /// Server port
    pub port: u16,
    /// SQLite database file path
    pub database_path: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            telegram_token: "test_telegram_token".to_string(),
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            webhook_url: "https://bot.example.com".to_string(),
            port: 8080,
            database_path: ":memory:".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing required variables fail fast so a misconfigured deployment
    /// never starts serving.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            telegram_token: env::var("TELEGRAM_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TELEGRAM_TOKEN"))?,
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            webhook_url: env::var("WEBHOOK_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_URL"))?,
            port: match env::var("PORT") {
                Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid("PORT"))?,
                Err(_) => 8080,
            },
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "kudobot.db".to_string()),
        })
    }

    /// The OAuth redirect URI registered with Strava.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/strava_callback", self.webhook_url)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
