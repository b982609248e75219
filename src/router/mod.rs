pub mod dispatch;
pub mod followup;
pub mod limiter;
pub mod ops_log;
pub mod resolver;
pub mod role_names;
pub mod table;

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::platform::{ChatPlatform, IncomingMessage};
use dispatch::Dispatcher;
use followup::FollowUpCorrelator;
use limiter::RateLimiter;
use ops_log::OpsLog;
use role_names::RoleNameCache;
use table::{RouteStore, RoutingEntry, RoutingTable};

static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// Static settings the router runs with
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub watch_channel_ids: Vec<u64>,
    pub log_channel_id: u64,
    pub role_channel_id: u64,
    pub role_history_limit: usize,
    pub guild_id: u64,
    pub category_id: Option<u64>,
    pub followup_window: chrono::Duration,
    pub rate_per_second: u32,
    pub links_per_message: usize,
    pub log_chunk_size: usize,
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            watch_channel_ids: config.discord.watch_channel_ids.clone(),
            log_channel_id: config.discord.log_channel_id,
            role_channel_id: config.discord.role_channel_id,
            role_history_limit: config.routing.role_history_limit,
            guild_id: config.discord.guild_id,
            category_id: config.discord.category_id,
            followup_window: chrono::Duration::seconds(config.routing.followup_window_secs as i64),
            rate_per_second: config.routing.rate_per_second,
            links_per_message: config.routing.links_per_message,
            log_chunk_size: config.routing.log_chunk_size,
        }
    }
}

/// Media references in a message: attachments first, then body links
pub fn extract_media_urls(message: &IncomingMessage) -> Vec<String> {
    let mut urls = message.attachment_urls.clone();
    urls.extend(
        LINK.find_iter(&message.content)
            .map(|m| m.as_str().to_string()),
    );
    urls
}

/// Relays media from watched channels to per-role destination channels.
///
/// Owns all mutable routing state. Constructed once at startup and shared
/// behind an `Arc` with the gateway handler.
pub struct Router {
    platform: Arc<dyn ChatPlatform>,
    settings: RouterSettings,
    table: RwLock<RoutingTable>,
    store: RouteStore,
    role_names: RoleNameCache,
    followups: Mutex<FollowUpCorrelator>,
    dispatcher: Dispatcher,
    ops: OpsLog,
    /// Held across miss -> provision -> insert for unknown roles
    provisioning: Mutex<()>,
}

impl Router {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        settings: RouterSettings,
        table: RoutingTable,
        store: RouteStore,
    ) -> Self {
        let ops = OpsLog::new(platform.clone(), settings.log_channel_id);
        let dispatcher = Dispatcher::new(
            platform.clone(),
            RateLimiter::per_second(settings.rate_per_second),
            settings.links_per_message,
            ops.clone(),
        );
        Self {
            followups: Mutex::new(FollowUpCorrelator::new(settings.followup_window)),
            platform,
            table: RwLock::new(table),
            store,
            role_names: RoleNameCache::new(),
            dispatcher,
            ops,
            provisioning: Mutex::new(()),
            settings,
        }
    }

    pub fn ops_log(&self) -> &OpsLog {
        &self.ops
    }

    /// First scan of the role name channel
    pub async fn build_role_names(&self) {
        match self
            .role_names
            .build(
                self.platform.as_ref(),
                self.settings.role_channel_id,
                self.settings.role_history_limit,
            )
            .await
        {
            Ok(count) => info!("Role name cache built with {} roles", count),
            Err(e) => self.ops.post_error(&e).await,
        }
    }

    /// Rescan the role name channel, keeping the old names on failure
    pub async fn refresh_role_names(&self) {
        match self
            .role_names
            .refresh(
                self.platform.as_ref(),
                self.settings.role_channel_id,
                self.settings.role_history_limit,
            )
            .await
        {
            Ok(count) => info!("Role name cache refreshed: {} roles", count),
            Err(e) => self.ops.post_error(&e).await,
        }
    }

    /// Entry point for every gateway message. Errors are reported to the
    /// log channel and the message is dropped.
    pub async fn handle_message(&self, message: IncomingMessage) {
        self.handle_message_at(message, Utc::now()).await;
    }

    pub async fn handle_message_at(&self, message: IncomingMessage, now: DateTime<Utc>) {
        if message.author_is_bot || !self.settings.watch_channel_ids.contains(&message.channel_id)
        {
            return;
        }

        if let Err(e) = self.process_message(&message, now).await {
            error!(
                "Error processing message {} in channel {}: {:#}",
                message.message_id, message.channel_id, e
            );
            self.ops.post_error(&e).await;
        }
    }

    async fn process_message(&self, message: &IncomingMessage, now: DateTime<Utc>) -> Result<()> {
        let media = extract_media_urls(message);
        let roles = self.roles_for_message(message, &media, now).await?;

        debug!(
            "Message {} from {}: {} media, roles {:?}",
            message.message_id,
            message.author_id,
            media.len(),
            roles
        );

        // Every role gets the full media list
        for role_id in &roles {
            self.route_role(role_id, &media).await?;
        }
        Ok(())
    }

    /// Direct mentions win, then the replied-to message's mentions, then the
    /// author's recent mention if the message carries media
    async fn roles_for_message(
        &self,
        message: &IncomingMessage,
        media: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if !message.mentioned_role_ids.is_empty() {
            let roles = message.mentioned_role_ids.clone();
            self.followups
                .lock()
                .await
                .record_mention(message.author_id, roles.clone(), now);
            return Ok(roles);
        }

        if let Some(referenced_id) = message.referenced_message_id {
            match self
                .platform
                .fetch_message(message.channel_id, referenced_id)
                .await
            {
                Ok(Some(referenced)) if !referenced.mentioned_role_ids.is_empty() => {
                    let roles = referenced.mentioned_role_ids;
                    self.followups
                        .lock()
                        .await
                        .record_mention(message.author_id, roles.clone(), now);
                    return Ok(roles);
                }
                Ok(Some(_)) => {}
                Ok(None) => warn!(
                    "Referenced message {} not found in channel {}",
                    referenced_id, message.channel_id
                ),
                Err(e) => warn!(
                    "Could not fetch referenced message {} in channel {}: {:#}",
                    referenced_id, message.channel_id, e
                ),
            }
        }

        if media.is_empty() {
            return Ok(Vec::new());
        }

        match self
            .followups
            .lock()
            .await
            .try_correlate(message.author_id, now)
        {
            Some(roles) => {
                debug!(
                    "Follow-up from user {} matched roles {:?}",
                    message.author_id, roles
                );
                Ok(roles)
            }
            None => {
                info!(
                    "No role context for message {} from user {}; {} media not forwarded",
                    message.message_id,
                    message.author_id,
                    media.len()
                );
                Ok(Vec::new())
            }
        }
    }

    async fn route_role(&self, role_id: &str, media: &[String]) -> Result<()> {
        let known = self
            .table
            .read()
            .await
            .lookup(role_id)
            .map(|(_, entry)| entry.clone());

        let entry = match known {
            Some(entry) => entry,
            None => match self.resolve_unknown_role(role_id, media).await? {
                Some(entry) => entry,
                None => return Ok(()),
            },
        };

        self.dispatch_entry(&entry, media).await
    }

    async fn dispatch_entry(&self, entry: &RoutingEntry, media: &[String]) -> Result<()> {
        let channel_id = match entry.channel_id.trim().parse::<u64>() {
            Ok(id) => id,
            Err(_) => {
                let scope = if entry.group.is_some() { "group" } else { "member" };
                self.ops
                    .post(&format!(
                        "No channel found for {} with role ID: {}",
                        scope, entry.role_id
                    ))
                    .await;
                return Ok(());
            }
        };

        self.dispatcher.send_media(channel_id, media).await?;
        Ok(())
    }

    /// Snapshot of the current routing table
    #[cfg(test)]
    pub async fn routing_table(&self) -> RoutingTable {
        self.table.read().await.clone()
    }
}
