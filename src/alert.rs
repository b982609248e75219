use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: String,
}

/// Posts startup failures to an external webhook
pub struct Alerter {
    client: reqwest::Client,
    webhook_url: String,
    mention_user_id: Option<u64>,
}

impl Alerter {
    pub fn from_config(config: &Config) -> Option<Self> {
        let (url, mention_user_id) = config.alert_webhook()?;
        Some(Self {
            client: reqwest::Client::new(),
            webhook_url: url.to_string(),
            mention_user_id,
        })
    }

    fn payload(&self, text: &str) -> WebhookPayload {
        let content = match self.mention_user_id {
            Some(user_id) => format!("<@{}> {}", user_id, text),
            None => text.to_string(),
        };
        WebhookPayload { content }
    }

    pub async fn send(&self, text: &str) -> Result<()> {
        debug!("Sending alert webhook");
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&self.payload(text))
            .send()
            .await
            .context("Failed to send alert webhook")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Alert webhook error ({}): {}", status, body);
        }
        Ok(())
    }
}
