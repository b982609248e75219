mod alert;
mod config;
mod platform;
mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serenity::http::Http;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::alert::Alerter;
use crate::config::Config;
use crate::platform::discord::{self, DiscordPlatform};
use crate::platform::ChatPlatform;
use crate::router::table::RouteStore;
use crate::router::{Router, RouterSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rolerelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Watched channels: {:?}", config.discord.watch_channel_ids);
    info!("  Log channel: {}", config.discord.log_channel_id);
    info!("  Role name channel: {}", config.discord.role_channel_id);
    info!("  Destination guild: {}", config.discord.guild_id);
    info!("  Routing document: {}", config.routing.database_path.display());

    let store = RouteStore::new(config.routing.database_path.clone());
    let table = store.load()?;
    info!(
        "Routing table loaded: {} names, {} roles",
        table.name_count(),
        table.role_count()
    );

    let http = Arc::new(Http::new(&config.discord.token));
    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordPlatform::new(http.clone()));
    let router = Arc::new(Router::new(
        platform,
        RouterSettings::from_config(&config),
        table,
        store,
    ));

    info!("Relay is starting...");
    if let Err(e) = discord::run(&config.discord, http, router).await {
        error!("Startup failed: {:#}", e);
        if let Some(alerter) = Alerter::from_config(&config) {
            if let Err(alert_err) = alerter
                .send(&format!("rolerelay failed to start: {:#}", e))
                .await
            {
                warn!("Failed to deliver alert: {:#}", alert_err);
            }
        }
        return Err(e);
    }

    Ok(())
}
