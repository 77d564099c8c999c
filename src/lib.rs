// SPDX-License-Identifier: MIT

//! Kudobot: a Telegram ↔ Strava bridge.
//!
//! Users link their Strava account through the OAuth authorization-code
//! flow, browse their recent activities (with photos) in chat, and like
//! them; when two users have liked a common activity, both get told about
//! their mutual like.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{CommandRouter, LinkService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub commands: CommandRouter,
    pub links: LinkService,
}
