// SPDX-License-Identifier: MIT

//! Domain models: persisted rows, transient provider records, and the
//! inbound Telegram update envelope.

pub mod activity;
pub mod telegram;
pub mod user;

pub use activity::{Activity, ActivityPhoto, Athlete};
pub use telegram::{CallbackQuery, Chat, Message, TelegramUser, Update};
pub use user::UserLink;
