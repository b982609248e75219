pub mod discord;
#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;

/// A message received from a watched channel
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_is_bot: bool,
    /// The message text
    pub content: String,
    /// Attachment URLs in attachment order
    pub attachment_urls: Vec<String>,
    pub mentioned_role_ids: Vec<String>,
    /// Set when the message is a reply
    pub referenced_message_id: Option<u64>,
}

/// A previously posted message, as returned by history and single-message fetches
#[derive(Debug, Clone, Default)]
pub struct HistoryMessage {
    pub id: u64,
    pub content: String,
    pub mentioned_role_ids: Vec<String>,
}

/// Operations the relay needs from the chat platform.
///
/// Lookups return `Ok(None)` or `Ok(false)` when the platform reports the
/// entity as unknown;
/// `Err` is reserved for transport failures and rejected requests.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn channel_exists(&self, channel_id: u64) -> Result<bool>;

    /// Whether the guild is visible to the bot
    async fn guild_exists(&self, guild_id: u64) -> Result<bool>;

    /// Up to `limit` most recent messages, newest first
    async fn fetch_message_history(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>>;

    async fn fetch_message(&self, channel_id: u64, message_id: u64)
        -> Result<Option<HistoryMessage>>;

    async fn send_message(&self, channel_id: u64, text: &str) -> Result<()>;

    /// Create a text channel and return its id
    async fn create_text_channel(
        &self,
        guild_id: u64,
        name: &str,
        parent_category_id: Option<u64>,
        audit_reason: &str,
    ) -> Result<u64>;
}
