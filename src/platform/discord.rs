use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, ChannelType, Context, CreateChannel, EventHandler, GatewayIntents, GetMessages,
    GuildId, Message, MessageId, Ready,
};
use serenity::http::{Http, HttpError};
use serenity::Client;
use tracing::{debug, info};

use super::{ChatPlatform, HistoryMessage, IncomingMessage};
use crate::config::DiscordConfig;
use crate::router::Router;

/// Discord caps a single history page at 100 messages
const HISTORY_PAGE_SIZE: usize = 100;

/// `ChatPlatform` backed by serenity's REST client
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

fn history_message(msg: &Message) -> HistoryMessage {
    HistoryMessage {
        id: msg.id.get(),
        content: msg.content.clone(),
        mentioned_role_ids: msg.mention_roles.iter().map(|r| r.to_string()).collect(),
    }
}

fn incoming_message(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        message_id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        author_id: msg.author.id.get(),
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
        attachment_urls: msg.attachments.iter().map(|a| a.url.clone()).collect(),
        mentioned_role_ids: msg.mention_roles.iter().map(|r| r.to_string()).collect(),
        referenced_message_id: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| id.get()),
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn channel_exists(&self, channel_id: u64) -> Result<bool> {
        match self.http.get_channel(ChannelId::new(channel_id)).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch channel {}", channel_id)),
        }
    }

    async fn guild_exists(&self, guild_id: u64) -> Result<bool> {
        match self.http.get_guild(GuildId::new(guild_id)).await {
            Ok(guild) => {
                debug!("Destination guild {} is '{}'", guild_id, guild.name);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch guild {}", guild_id)),
        }
    }

    async fn fetch_message_history(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let channel = ChannelId::new(channel_id);
        let mut collected = Vec::new();
        let mut before: Option<MessageId> = None;

        // Page backwards from the newest message
        while collected.len() < limit {
            let page_size = (limit - collected.len()).min(HISTORY_PAGE_SIZE);
            let mut request = GetMessages::new().limit(page_size as u8);
            if let Some(id) = before {
                request = request.before(id);
            }

            let page = channel
                .messages(&self.http, request)
                .await
                .with_context(|| format!("Failed to fetch history of channel {}", channel_id))?;

            let Some(oldest) = page.last() else {
                break;
            };
            before = Some(oldest.id);
            let exhausted = page.len() < page_size;
            collected.extend(page.iter().map(history_message));
            if exhausted {
                break;
            }
        }

        debug!(
            "Fetched {} history messages from channel {}",
            collected.len(),
            channel_id
        );
        Ok(collected)
    }

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Option<HistoryMessage>> {
        match ChannelId::new(channel_id)
            .message(&self.http, MessageId::new(message_id))
            .await
        {
            Ok(msg) => Ok(Some(history_message(&msg))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e).with_context(|| {
                format!(
                    "Failed to fetch message {} in channel {}",
                    message_id, channel_id
                )
            }),
        }
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> Result<()> {
        ChannelId::new(channel_id)
            .say(&self.http, text)
            .await
            .with_context(|| format!("Failed to send message to channel {}", channel_id))?;
        Ok(())
    }

    async fn create_text_channel(
        &self,
        guild_id: u64,
        name: &str,
        parent_category_id: Option<u64>,
        audit_reason: &str,
    ) -> Result<u64> {
        let mut builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .audit_log_reason(audit_reason);
        if let Some(category) = parent_category_id {
            builder = builder.category(ChannelId::new(category));
        }

        let channel = GuildId::new(guild_id)
            .create_channel(&self.http, builder)
            .await
            .with_context(|| format!("Failed to create channel '{}' in guild {}", name, guild_id))?;
        Ok(channel.id.get())
    }
}

/// Gateway event handler feeding the router
struct RelayHandler {
    router: Arc<Router>,
    role_names_built: AtomicBool,
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is ready! ({} guilds)", ready.user.name, ready.guilds.len());
        self.router
            .ops_log()
            .post(&format!("Bot started successfully: {}", ready.user.name))
            .await;

        // Later ready events come from gateway re-identifies
        if self.role_names_built.swap(true, Ordering::SeqCst) {
            self.router.refresh_role_names().await;
        } else {
            self.router.build_role_names().await;
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        self.router.handle_message(incoming_message(&msg)).await;
    }
}

fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Authenticate, connect to the gateway and relay messages until the connection ends
pub async fn run(config: &DiscordConfig, http: Arc<Http>, router: Arc<Router>) -> Result<()> {
    let me = http
        .get_current_user()
        .await
        .context("Failed to authenticate with Discord (invalid token?)")?;
    info!("Authenticated as {} ({})", me.name, me.id);

    let handler = RelayHandler {
        router,
        role_names_built: AtomicBool::new(false),
    };

    let mut client = Client::builder(&config.token, intents())
        .event_handler(handler)
        .await
        .context("Failed to build Discord client")?;

    info!("Starting Discord gateway...");
    client
        .start()
        .await
        .context("Discord gateway connection failed")?;

    Ok(())
}
