// src/notify/mod.rs
//! Delivery sinks: where formatted batches end up.

pub mod discord;
pub mod log;
pub mod telegram;

use std::sync::Arc;

use crate::config::{DeliveryConfig, SinkKind};
use crate::error::DeliveryError;

/// Markup dialect of the outgoing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Plain,
    Markdown,
}

impl Markup {
    pub fn telegram_parse_mode(&self) -> Option<&'static str> {
        match self {
            Markup::Plain => None,
            Markup::Markdown => Some("Markdown"),
        }
    }
}

/// One outbound call's worth of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: String,
    pub text: String,
    pub disable_preview: bool,
    pub markup: Markup,
}

#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, msg: &Delivery) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/// Build the sink selected by `cfg.kind`. Missing credentials are a startup error.
pub fn build_sink(cfg: &DeliveryConfig) -> Result<Arc<dyn DeliverySink>, DeliveryError> {
    match cfg.kind {
        SinkKind::Telegram => {
            let token = cfg
                .bot_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .ok_or(DeliveryError::NotConfigured("telegram bot token"))?;
            if cfg.chat_id.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(DeliveryError::NotConfigured("telegram chat id"));
            }
            Ok(Arc::new(
                telegram::TelegramSink::new(token)
                    .with_api_base(cfg.api_base.clone())
                    .with_timeout(cfg.timeout()),
            ))
        }
        SinkKind::Discord => {
            let url = cfg
                .webhook_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .ok_or(DeliveryError::NotConfigured("discord webhook url"))?;
            Ok(Arc::new(
                discord::DiscordSink::new(url).with_timeout(cfg.timeout_secs),
            ))
        }
        SinkKind::Log => Ok(Arc::new(log::LogSink)),
    }
}
