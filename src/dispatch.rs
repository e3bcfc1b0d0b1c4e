// src/dispatch.rs
//! Batch dispatcher: accumulates accepted candidates and flushes fixed-size
//! batches to the delivery sink, pausing after each full batch.
//!
//! Failed deliveries are logged and dropped. The items stay recorded as seen,
//! so a failed batch is never redelivered.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ingest::scheduler::sleep_or_cancel;
use crate::notify::{Delivery, DeliverySink, Markup};

/// An entry that passed every check this cycle and awaits delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub feed_name: String,
    pub title: String,
    pub url: String,
    pub content_summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered(usize),
    Failed(usize),
}

/// Swap characters that are markup in Telegram's legacy Markdown.
pub fn escape_title(title: &str) -> String {
    title.replace('*', "×").replace('_', " ").replace('`', "'")
}

/// Numbered list of titles and URLs with a trailing count line.
pub fn format_batch(items: &[Candidate]) -> String {
    let mut text = String::from("📰 *Berita Terkini*\n\n");
    for (i, c) in items.iter().enumerate() {
        text.push_str(&format!("*{}. {}*\n{}\n\n", i + 1, escape_title(&c.title), c.url));
    }
    text.push_str(&format!("_📊 Total: {} berita_", items.len()));
    text
}

pub struct BatchDispatcher {
    sink: Arc<dyn DeliverySink>,
    recipient: String,
    batch_size: usize,
    pause: Duration,
    disable_preview: bool,
    pending: Vec<Candidate>,
    cancel: CancellationToken,
    delivered: usize,
    failed: usize,
}

impl BatchDispatcher {
    pub fn new(sink: Arc<dyn DeliverySink>, recipient: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            recipient: recipient.into(),
            batch_size,
            pause: Duration::from_secs(1),
            disable_preview: false,
            pending: Vec::with_capacity(batch_size),
            cancel: CancellationToken::new(),
            delivered: 0,
            failed: 0,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_disable_preview(mut self, disable: bool) -> Self {
        self.disable_preview = disable;
        self
    }

    /// Cancellation cuts the inter-batch pause short.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn pending(&self) -> &[Candidate] {
        &self.pending
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches handed to the sink successfully since construction.
    pub fn delivered_batches(&self) -> usize {
        self.delivered
    }

    pub fn failed_batches(&self) -> usize {
        self.failed
    }

    /// Append `c`; a full batch is flushed right away, followed by the pause.
    pub async fn add(&mut self, c: Candidate) -> Option<FlushOutcome> {
        self.pending.push(c);
        if self.pending.len() < self.batch_size {
            return None;
        }
        let out = self.flush().await;
        sleep_or_cancel(self.pause, &self.cancel).await;
        out
    }

    /// Send whatever is pending, even below batch size. No-op when empty.
    pub async fn flush(&mut self) -> Option<FlushOutcome> {
        if self.pending.is_empty() {
            return None;
        }
        let items = std::mem::take(&mut self.pending);
        let n = items.len();
        let msg = Delivery {
            recipient: self.recipient.clone(),
            text: format_batch(&items),
            disable_preview: self.disable_preview,
            markup: Markup::Markdown,
        };

        match self.sink.deliver(&msg).await {
            Ok(()) => {
                info!(target: "dispatch", sink = self.sink.name(), items = n, "batch delivered");
                counter!("dispatch_batches_total").increment(1);
                self.delivered += 1;
                Some(FlushOutcome::Delivered(n))
            }
            Err(e) => {
                error!(target: "dispatch", sink = self.sink.name(), items = n, error = %e, "batch delivery failed");
                counter!("dispatch_failures_total").increment(1);
                self.failed += 1;
                Some(FlushOutcome::Failed(n))
            }
        }
    }
}
