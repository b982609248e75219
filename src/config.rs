use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default = "default_routing_config")]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub alerts: Option<AlertConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Bot token. Falls back to `DISCORD_TOKEN` when left empty.
    #[serde(default)]
    pub token: String,
    /// Source channels whose messages get relayed
    pub watch_channel_ids: Vec<u64>,
    /// Channel receiving operator log lines
    pub log_channel_id: u64,
    /// Channel whose history lists `<name> <role id>` lines
    pub role_channel_id: u64,
    /// Server where new destination channels are created
    pub guild_id: u64,
    /// Category new destination channels are placed under
    #[serde(default)]
    pub category_id: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_role_history_limit")]
    pub role_history_limit: usize,
    #[serde(default = "default_followup_window_secs")]
    pub followup_window_secs: u64,
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: u32,
    #[serde(default = "default_links_per_message")]
    pub links_per_message: usize,
    #[serde(default = "default_log_chunk_size")]
    pub log_chunk_size: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertConfig {
    /// Discord-compatible webhook hit on startup failures
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// User pinged in alert messages
    #[serde(default)]
    pub mention_user_id: Option<u64>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db.json")
}

fn default_role_history_limit() -> usize {
    100
}

fn default_followup_window_secs() -> u64 {
    300
}

fn default_rate_per_second() -> u32 {
    35
}

fn default_links_per_message() -> usize {
    5
}

fn default_log_chunk_size() -> usize {
    2000
}

fn default_routing_config() -> RoutingConfig {
    RoutingConfig {
        database_path: default_db_path(),
        role_history_limit: default_role_history_limit(),
        followup_window_secs: default_followup_window_secs(),
        rate_per_second: default_rate_per_second(),
        links_per_message: default_links_per_message(),
        log_chunk_size: default_log_chunk_size(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;

        if config.discord.token.trim().is_empty() {
            config.discord.token = std::env::var("DISCORD_TOKEN").unwrap_or_default();
        }
        config.validate()?;

        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            anyhow::bail!("No bot token: set [discord] token or DISCORD_TOKEN");
        }
        if self.discord.watch_channel_ids.is_empty() {
            anyhow::bail!("[discord] watch_channel_ids must list at least one channel");
        }
        if self.routing.rate_per_second == 0 {
            anyhow::bail!("[routing] rate_per_second must be greater than zero");
        }
        if self.routing.links_per_message == 0 {
            anyhow::bail!("[routing] links_per_message must be greater than zero");
        }
        if self.routing.log_chunk_size == 0 {
            anyhow::bail!("[routing] log_chunk_size must be greater than zero");
        }
        Ok(())
    }

    /// Webhook alert settings, if a webhook URL is configured.
    pub fn alert_webhook(&self) -> Option<(&str, Option<u64>)> {
        let alerts = self.alerts.as_ref()?;
        let url = alerts.webhook_url.as_deref()?;
        Some((url, alerts.mention_user_id))
    }
}
