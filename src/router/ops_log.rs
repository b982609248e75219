use std::sync::Arc;

use tracing::{error, info};

use crate::platform::ChatPlatform;

/// Operator-facing log: every line goes to tracing and to the log channel.
#[derive(Clone)]
pub struct OpsLog {
    platform: Arc<dyn ChatPlatform>,
    channel_id: u64,
}

impl OpsLog {
    pub fn new(platform: Arc<dyn ChatPlatform>, channel_id: u64) -> Self {
        Self {
            platform,
            channel_id,
        }
    }

    pub async fn post(&self, text: &str) {
        info!("{}", text);
        self.deliver(text).await;
    }

    pub async fn post_error(&self, err: &anyhow::Error) {
        let text = format!("Error: {:#}", err);
        error!("{}", text);
        self.deliver(&text).await;
    }

    async fn deliver(&self, text: &str) {
        match self.platform.channel_exists(self.channel_id).await {
            Ok(true) => {
                if let Err(e) = self.platform.send_message(self.channel_id, text).await {
                    error!("Failed to post to log channel: {:#}", e);
                }
            }
            Ok(false) => error!("Log channel ID {} not found.", self.channel_id),
            Err(e) => error!("Failed to resolve log channel: {:#}", e),
        }
    }
}
