use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{Delivery, DeliverySink, Markup};
use crate::error::DeliveryError;

// Discord rejects message content longer than this
const MAX_CONTENT_CHARS: usize = 2000;

/// Posts each batch to a webhook. One request per batch; failures are returned as-is.
#[derive(Clone)]
pub struct DiscordSink {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl DiscordSink {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// Telegram legacy Markdown bolds with `*x*`; Discord reads that as italics.
fn discord_markdown(text: &str, markup: Markup) -> String {
    match markup {
        Markup::Plain => text.to_string(),
        Markup::Markdown => text.replace('*', "**"),
    }
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: String,
}

impl DiscordWebhookPayload {
    fn from_delivery(msg: &Delivery) -> Self {
        // no per-message preview toggle on webhooks; `disable_preview` is ignored
        let text = discord_markdown(&msg.text, msg.markup);
        Self {
            content: crate::ingest::truncate_chars(&text, MAX_CONTENT_CHARS),
        }
    }
}

#[async_trait]
impl DeliverySink for DiscordSink {
    async fn deliver(&self, msg: &Delivery) -> Result<(), DeliveryError> {
        let payload = DiscordWebhookPayload::from_delivery(msg);

        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        if rsp.status().is_success() {
            return Ok(());
        }
        let status = rsp.status().as_u16();
        let body = rsp.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status,
            body: crate::ingest::truncate_chars(&body, 300),
        })
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
