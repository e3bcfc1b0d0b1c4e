// src/notify/telegram.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{Delivery, DeliverySink};
use crate::error::DeliveryError;

/// Telegram Bot API `sendMessage`. One HTTP call per delivery, no retry.
#[derive(Clone)]
pub struct TelegramSink {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

impl TelegramSink {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_base: "https://api.telegram.org".to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base(mut self, base: String) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(&self, msg: &Delivery) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id: &msg.recipient,
            text: &msg.text,
            disable_web_page_preview: msg.disable_preview,
            parse_mode: msg.markup.telegram_parse_mode(),
        };

        let rsp = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: crate::ingest::truncate_chars(&text, 300),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
