// SPDX-License-Identifier: MIT

//! Kudobot service binary.
//!
//! Reads configuration from the environment, wires the services together,
//! registers the Telegram webhook, and serves the two inbound endpoints.

use kudobot::{
    config::Config,
    db::Database,
    services::{
        CommandRouter, LinkService, MutualLikeService, PendingLinks, ReplySink, StravaClient,
        StravaService, TelegramClient,
    },
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often stale pending handshakes are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Missing required env vars fail fast here
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting kudobot");

    let db = Database::new(&config.database_path).await?;
    tracing::info!(path = %config.database_path, "Database opened");

    let telegram = TelegramClient::new(&config.telegram_token);
    let sink: Arc<dyn ReplySink> = Arc::new(telegram.clone());

    let strava = StravaService::new(
        StravaClient::new(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        ),
        db.clone(),
    );

    let pending = Arc::new(PendingLinks::new());
    let links = LinkService::new(
        pending.clone(),
        strava.clone(),
        db.clone(),
        sink.clone(),
        config.strava_client_id.clone(),
        config.oauth_redirect_uri(),
    );

    let mutual = MutualLikeService::new(db.clone(), strava.clone(), sink.clone());
    let commands = CommandRouter::new(db, strava, links.clone(), mutual, sink);

    // Telegram must know where to POST updates. Best-effort: a transient
    // failure here should not keep the service down, the webhook can be
    // re-registered by restarting.
    let webhook_url = format!("{}/{}", config.webhook_url, config.telegram_token);
    match telegram.set_webhook(&webhook_url).await {
        Ok(()) => tracing::info!("Telegram webhook registered"),
        Err(e) => tracing::warn!(error = %e, "Failed to register Telegram webhook"),
    }

    // Sweep expired OAuth handshakes in the background
    let sweeper_pending = pending.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper_pending.sweep(chrono::Utc::now().timestamp());
            if removed > 0 {
                tracing::debug!(removed, "Swept expired pending links");
            }
        }
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        commands,
        links,
    });

    let app = kudobot::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kudobot=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
