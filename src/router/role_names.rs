use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::debug;

use crate::platform::ChatPlatform;

/// `<name> <17-19 digit role id>` at the end of a line
static ROLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+(\d{17,19})$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleNameLookup {
    /// `build` has not completed yet
    NotReady,
    Missing,
    Found(String),
}

/// Role id -> display name, scraped from the reference channel's history
pub struct RoleNameCache {
    names: RwLock<Option<HashMap<String, String>>>,
}

/// Extract `(role id, name)` pairs from one message body
pub fn parse_role_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let caps = ROLE_LINE.captures(line.trim())?;
            let name = caps.get(1)?.as_str().trim();
            let id = caps.get(2)?.as_str();
            Some((id.to_string(), name.to_string()))
        })
        .collect()
}

impl RoleNameCache {
    pub fn new() -> Self {
        Self {
            names: RwLock::new(None),
        }
    }

    /// Scan up to `history_limit` messages of the reference channel and
    /// replace the cache contents. Messages are applied in the order the
    /// platform returns them, so a later message wins for a repeated id.
    pub async fn build(
        &self,
        platform: &dyn ChatPlatform,
        channel_id: u64,
        history_limit: usize,
    ) -> Result<usize> {
        let history = platform
            .fetch_message_history(channel_id, history_limit)
            .await
            .with_context(|| format!("Failed to read role names from channel {}", channel_id))?;

        let mut names = HashMap::new();
        for message in &history {
            for (id, name) in parse_role_lines(&message.content) {
                debug!("Role {} is '{}' (message {})", id, name, message.id);
                names.insert(id, name);
            }
        }

        let count = names.len();
        *self.names.write().await = Some(names);
        Ok(count)
    }

    /// Rebuild from scratch. A failed refresh keeps the previous contents.
    pub async fn refresh(
        &self,
        platform: &dyn ChatPlatform,
        channel_id: u64,
        history_limit: usize,
    ) -> Result<usize> {
        self.build(platform, channel_id, history_limit).await
    }

    pub async fn lookup(&self, role_id: &str) -> RoleNameLookup {
        match self.names.read().await.as_ref() {
            None => RoleNameLookup::NotReady,
            Some(names) => match names.get(role_id) {
                Some(name) => RoleNameLookup::Found(name.clone()),
                None => RoleNameLookup::Missing,
            },
        }
    }
}
