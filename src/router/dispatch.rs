use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error};

use super::limiter::RateLimiter;
use super::ops_log::OpsLog;
use crate::platform::ChatPlatform;

/// Pack whole lines into chunks of at most `max_length` bytes.
///
/// Joining the chunks with `'\n'` gives back the input. A single line longer
/// than `max_length` becomes its own oversized chunk.
pub fn split_text_into_chunks(text: &str, max_length: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current: Option<String> = None;

    for line in text.split('\n') {
        current = Some(match current.take() {
            Some(mut chunk) if chunk.len() + 1 + line.len() <= max_length => {
                chunk.push('\n');
                chunk.push_str(line);
                chunk
            }
            Some(chunk) => {
                chunks.push(chunk);
                line.to_string()
            }
            None => line.to_string(),
        });
    }

    chunks.extend(current);
    chunks
}

/// Sends media links to destination channels, a fixed number of links per
/// message, with every send admitted through the rate limiter.
pub struct Dispatcher {
    platform: Arc<dyn ChatPlatform>,
    limiter: RateLimiter,
    links_per_message: usize,
    ops: OpsLog,
}

impl Dispatcher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        limiter: RateLimiter,
        links_per_message: usize,
        ops: OpsLog,
    ) -> Self {
        Self {
            platform,
            limiter,
            links_per_message: links_per_message.max(1),
            ops,
        }
    }

    /// Forward `urls` to a channel. Returns the number of messages sent.
    ///
    /// A missing channel is logged and skipped. Failed sends are logged and
    /// the remaining batches still go out.
    pub async fn send_media(&self, channel_id: u64, urls: &[String]) -> Result<usize> {
        if !self.platform.channel_exists(channel_id).await? {
            self.ops
                .post(&format!("Channel ID {} not found.", channel_id))
                .await;
            return Ok(0);
        }

        let mut sent = 0;
        for batch in urls.chunks(self.links_per_message) {
            let text = batch.join("\n");
            let result = self
                .limiter
                .schedule(self.platform.send_message(channel_id, &text))
                .await;
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!("Failed to forward media to {}: {:#}", channel_id, e);
                    self.ops.post_error(&e).await;
                }
            }
        }

        debug!(
            "Forwarded {} links to channel {} in {} messages",
            urls.len(),
            channel_id,
            sent
        );
        Ok(sent)
    }
}
