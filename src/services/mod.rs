// SPDX-License-Identifier: MIT

//! Domain services.

pub mod commands;
pub mod linking;
pub mod mutual;
mod retry;
pub mod strava;
pub mod telegram;

pub use commands::CommandRouter;
pub use linking::{LinkService, PendingLinks};
pub use mutual::MutualLikeService;
pub use strava::{StravaClient, StravaService};
pub use telegram::{Button, ReplySink, TelegramClient};
