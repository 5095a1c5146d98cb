use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};
use xtrasnap_core::alert::{Alerter, format_alert, local_hostname};
use xtrasnap_core::config::SlackConfig;
use xtrasnap_core::{Error, Result};

pub const DEFAULT_USERNAME: &str = "BackupsBot";
pub const DEFAULT_ICON_EMOJI: &str = ":card_file_box:";

fn is_empty(value: &&str) -> bool {
    value.is_empty()
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct SlackMessage<'a> {
    #[serde(skip_serializing_if = "is_empty")]
    channel: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
    text: &'a str,
}

/// Posts alerts to a Slack incoming webhook. Every alert is also written to
/// the error log, whether or not the post succeeds.
pub struct SlackAlerter {
    client: Client,
    config: SlackConfig,
    hostname: String,
}

impl SlackAlerter {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Alert(format!("Failed to create Slack HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            hostname: local_hostname(),
        })
    }

    fn message<'a>(&'a self, text: &'a str) -> SlackMessage<'a> {
        let or_default = |value: &'a str, default: &'a str| if value.is_empty() { default } else { value };
        SlackMessage {
            channel: &self.config.channel,
            username: or_default(&self.config.username, DEFAULT_USERNAME),
            icon_emoji: or_default(&self.config.icon_emoji, DEFAULT_ICON_EMOJI),
            text,
        }
    }

    async fn post(&self, text: &str) -> Result<()> {
        if self.config.webhook_url.is_empty() {
            warn!("Slack webhook URL is not configured, alert was only logged");
            return Ok(());
        }

        self.client
            .post(&self.config.webhook_url)
            .json(&self.message(text))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Alert(format!("Could not post to Slack: {}", e)))?;
        Ok(())
    }

    async fn post_or_log(&self, text: &str) {
        if let Err(e) = self.post(text).await {
            error!(error = %e, "Alert was not delivered");
        }
    }
}

#[async_trait]
impl Alerter for SlackAlerter {
    async fn alert_error(&self, message: &str, err: &(dyn std::error::Error + Send + Sync)) {
        let text = format_alert(&self.hostname, message, err, Utc::now());
        error!("{}", text);
        self.post_or_log(&text).await;
    }

    async fn notify(&self, message: &str) {
        info!("{}", message);
        self.post_or_log(message).await;
    }
}
