// SPDX-License-Identifier: MIT

//! Typed Telegram Bot API update envelope.
//!
//! Only the fields the command router looks at are decoded; everything else
//! in the webhook payload is ignored by serde.

use serde::Deserialize;

/// One inbound update from the Telegram webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message (commands arrive as plain text).
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// The sender of a message or callback query.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

/// An inline-button press.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Opaque ID to acknowledge via answerCallbackQuery
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}
