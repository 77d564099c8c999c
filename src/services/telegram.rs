// SPDX-License-Identifier: MIT

//! Telegram Bot API client and the `ReplySink` capability.
//!
//! The adapter is strictly a transport: it owns no domain state. Handlers
//! receive it as `Arc<dyn ReplySink>` so the command router, linking
//! orchestrator, and mutual-like detector never depend on Telegram directly
//! (and tests can substitute a recording sink).

use crate::error::AppError;
use crate::services::retry::send_with_retry;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Wall-clock timeout for every outbound Bot API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// An inline button attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct Button {
    pub text: String,
    pub action: ButtonAction,
}

#[derive(Debug, Clone)]
pub enum ButtonAction {
    /// Opens a URL (used for the Strava authorize link)
    Url(String),
    /// Sends callback data back to the bot (used for likes)
    Callback(String),
}

impl Button {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }
}

/// Outbound messaging capability handed to domain handlers.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send a text message, optionally with one row of inline buttons.
    async fn send_text(&self, user_id: i64, text: &str, buttons: &[Button])
        -> Result<(), AppError>;

    /// Forward a photo by URL (no re-hosting).
    async fn send_photo(&self, user_id: i64, url: &str) -> Result<(), AppError>;

    /// Replace the text of a previously sent message.
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str)
        -> Result<(), AppError>;

    /// Acknowledge an inline-button press, optionally with a toast.
    async fn acknowledge_callback(
        &self,
        callback_id: &str,
        toast: Option<&str>,
    ) -> Result<(), AppError>;
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `https://api.telegram.org/bot<token>` in production; injectable for tests.
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{}", token))
    }

    /// Create a client against a custom API base URL (tests).
    pub fn with_base_url(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { http, base_url }
    }

    /// Register the webhook with Telegram. Called once at startup.
    pub async fn set_webhook(&self, url: &str) -> Result<(), AppError> {
        self.call("setWebhook", &json!({ "url": url })).await
    }

    /// POST one Bot API method and check the response envelope.
    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<(), AppError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = send_with_retry(self.http.post(&url).json(body)).await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!(
                "telegram {} failed: HTTP {}: {}",
                method, status, text
            )));
        }

        Ok(())
    }
}

/// Serialize one row of buttons as an InlineKeyboardMarkup.
fn inline_keyboard(buttons: &[Button]) -> serde_json::Value {
    let row: Vec<serde_json::Value> = buttons
        .iter()
        .map(|b| match &b.action {
            ButtonAction::Url(url) => json!({ "text": b.text, "url": url }),
            ButtonAction::Callback(data) => json!({ "text": b.text, "callback_data": data }),
        })
        .collect();

    json!({ "inline_keyboard": [row] })
}

#[async_trait]
impl ReplySink for TelegramClient {
    async fn send_text(
        &self,
        user_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), AppError> {
        let mut body = json!({ "chat_id": user_id, "text": text });
        if !buttons.is_empty() {
            body["reply_markup"] = inline_keyboard(buttons);
        }

        self.call("sendMessage", &body).await
    }

    async fn send_photo(&self, user_id: i64, url: &str) -> Result<(), AppError> {
        self.call("sendPhoto", &json!({ "chat_id": user_id, "photo": url }))
            .await
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), AppError> {
        self.call(
            "editMessageText",
            &json!({ "chat_id": chat_id, "message_id": message_id, "text": text }),
        )
        .await
    }

    async fn acknowledge_callback(
        &self,
        callback_id: &str,
        toast: Option<&str>,
    ) -> Result<(), AppError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(toast) = toast {
            body["text"] = json!(toast);
        }

        self.call("answerCallbackQuery", &body).await
    }
}
