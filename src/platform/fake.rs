//! In-memory platform used by the router tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{ChatPlatform, HistoryMessage};

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedChannel {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub parent_category_id: Option<u64>,
    pub audit_reason: String,
}

pub struct FakePlatform {
    channels: Mutex<HashMap<u64, String>>,
    guilds: Mutex<HashSet<u64>>,
    history: Mutex<HashMap<u64, Vec<HistoryMessage>>>,
    messages: Mutex<HashMap<u64, HistoryMessage>>,
    sent: Mutex<Vec<(u64, String)>>,
    created: Mutex<Vec<CreatedChannel>>,
    fail_channel_creation: AtomicBool,
    fail_guild_fetch: AtomicBool,
    fail_message_fetch: AtomicBool,
    next_channel_id: AtomicU64,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            guilds: Mutex::new(HashSet::new()),
            history: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            fail_channel_creation: AtomicBool::new(false),
            fail_guild_fetch: AtomicBool::new(false),
            fail_message_fetch: AtomicBool::new(false),
            next_channel_id: AtomicU64::new(900_000_000_000_000_000),
        }
    }

    pub fn add_channel(&self, id: u64, name: &str) {
        self.channels.lock().unwrap().insert(id, name.to_string());
    }

    pub fn add_guild(&self, id: u64) {
        self.guilds.lock().unwrap().insert(id);
    }

    pub fn set_history(&self, channel_id: u64, messages: Vec<HistoryMessage>) {
        self.history.lock().unwrap().insert(channel_id, messages);
    }

    pub fn add_message(&self, message: HistoryMessage) {
        self.messages.lock().unwrap().insert(message.id, message);
    }

    pub fn fail_channel_creation(&self, fail: bool) {
        self.fail_channel_creation.store(fail, Ordering::SeqCst);
    }

    pub fn fail_guild_fetch(&self, fail: bool) {
        self.fail_guild_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_message_fetch(&self, fail: bool) {
        self.fail_message_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == channel_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn created_channels(&self) -> Vec<CreatedChannel> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn channel_exists(&self, channel_id: u64) -> Result<bool> {
        Ok(self.channels.lock().unwrap().contains_key(&channel_id))
    }

    async fn guild_exists(&self, guild_id: u64) -> Result<bool> {
        if self.fail_guild_fetch.load(Ordering::SeqCst) {
            anyhow::bail!("503 Service Unavailable");
        }
        Ok(self.guilds.lock().unwrap().contains(&guild_id))
    }

    async fn fetch_message_history(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let history = self.history.lock().unwrap();
        Ok(history
            .get(&channel_id)
            .map(|messages| messages.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_message(
        &self,
        _channel_id: u64,
        message_id: u64,
    ) -> Result<Option<HistoryMessage>> {
        if self.fail_message_fetch.load(Ordering::SeqCst) {
            anyhow::bail!("403 Missing Access");
        }
        Ok(self.messages.lock().unwrap().get(&message_id).cloned())
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, text.to_string()));
        Ok(())
    }

    async fn create_text_channel(
        &self,
        guild_id: u64,
        name: &str,
        parent_category_id: Option<u64>,
        audit_reason: &str,
    ) -> Result<u64> {
        if self.fail_channel_creation.load(Ordering::SeqCst) {
            anyhow::bail!("Missing Permissions");
        }
        let id = self.next_channel_id.fetch_add(1, Ordering::SeqCst);
        self.add_channel(id, name);
        self.created.lock().unwrap().push(CreatedChannel {
            id,
            guild_id,
            name: name.to_string(),
            parent_category_id,
            audit_reason: audit_reason.to_string(),
        });
        Ok(id)
    }
}
