// tests/common/mod.rs
// In-process fakes for the poller's collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use newsbot_relay::config::{AppConfig, FeedSpec, StoreConfig};
use newsbot_relay::error::{DeliveryError, FeedError, FetchError};
use newsbot_relay::{
    BatchDispatcher, ContentFetcher, Delivery, DeliverySink, FeedEntry, FeedSource, Poller,
    SeenStore,
};

/// Feed URL → entries; URLs in `failing` return an error.
#[derive(Default)]
pub struct ScriptedFeeds {
    pub feeds: HashMap<String, Vec<FeedEntry>>,
    pub failing: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedFeeds {
    pub fn with(mut self, url: &str, entries: Vec<FeedEntry>) -> Self {
        self.feeds.insert(url.to_string(), entries);
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeeds {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FeedError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(FeedError::Parse("unexpected end of document".into()));
        }
        Ok(self.feeds.get(url).cloned().unwrap_or_default())
    }
}

/// Article URL → HTML body; unknown URLs fail with HTTP 503.
#[derive(Default)]
pub struct FakePages {
    pub bodies: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
    /// Cancelled right after the first successful fetch.
    pub cancel_after_first: Option<CancellationToken>,
}

impl FakePages {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for FakePages {
    async fn fetch(&self, url: &str, _timeout: Duration, _retries: u32) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(body) => {
                if let Some(c) = &self.cancel_after_first {
                    c.cancel();
                }
                Ok(body.clone())
            }
            None => Err(FetchError::Status {
                status: 503,
                url: url.to_string(),
            }),
        }
    }
}

/// Keeps every delivery; optionally fails them or cancels a token on delivery.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<Delivery>>,
    pub fail: AtomicBool,
    pub cancel_on_deliver: Option<CancellationToken>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let s = Self::default();
        s.fail.store(true, Ordering::SeqCst);
        s
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.text.clone())
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, msg: &Delivery) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(msg.clone());
        if let Some(c) = &self.cancel_on_deliver {
            c.cancel();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                status: 400,
                body: "Bad Request: can't parse entities".into(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Default keywords, no sleeping anywhere.
pub fn test_config(feeds: &[(&str, &str)]) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.feeds = feeds.iter().map(|(n, u)| FeedSpec::new(*n, *u)).collect();
    cfg.poll.feed_cooldown_secs = 0;
    cfg.poll.batch_pause_ms = 0;
    cfg.delivery.chat_id = Some("-1001".into());
    cfg
}

pub struct Harness {
    pub poller: Poller,
    pub feeds: Arc<ScriptedFeeds>,
    pub pages: Arc<FakePages>,
    pub sink: Arc<RecordingSink>,
}

pub async fn harness(
    cfg: AppConfig,
    feeds: ScriptedFeeds,
    pages: FakePages,
    sink: RecordingSink,
) -> Harness {
    let store = SeenStore::open_in_memory(&StoreConfig::default())
        .await
        .unwrap();
    harness_with_store(cfg, store, feeds, pages, sink)
}

pub fn harness_with_store(
    cfg: AppConfig,
    store: SeenStore,
    feeds: ScriptedFeeds,
    pages: FakePages,
    sink: RecordingSink,
) -> Harness {
    let feeds = Arc::new(feeds);
    let pages = Arc::new(pages);
    let sink = Arc::new(sink);
    let dispatcher = BatchDispatcher::new(
        sink.clone(),
        cfg.delivery.chat_id.clone().unwrap_or_default(),
        cfg.poll.batch_size,
    )
    .with_pause(cfg.poll.batch_pause());
    let poller = Poller::new(
        Arc::new(cfg),
        store,
        feeds.clone(),
        pages.clone(),
        dispatcher,
    );
    Harness {
        poller,
        feeds,
        pages,
        sink,
    }
}

pub fn entry(title: &str, link: &str) -> FeedEntry {
    FeedEntry::new(title, link)
}
