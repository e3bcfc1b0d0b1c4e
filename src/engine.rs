//! # Poll Engine
//! One cycle over the configured feeds: every entry ends in exactly one
//! [`Outcome`], accepted entries are recorded as seen and handed to the
//! [`BatchDispatcher`].
//!
//! Per-entry order of checks:
//! invalid → seen (URL/title only, before any download) → fetch → filtered
//! → duplicate content (second probe including the content sample) → sent.
//!
//! Nothing in here returns an error to the caller. Feed, fetch, store and
//! delivery failures become outcomes or log lines, and the cycle moves on.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, FeedSpec};
use crate::dispatch::{BatchDispatcher, Candidate};
use crate::error::FetchError;
use crate::ingest::extract_summary;
use crate::ingest::scheduler::sleep_or_cancel;
use crate::ingest::types::{ContentFetcher, FeedEntry, FeedSource};
use crate::relevance::KeywordFilter;
use crate::store::SeenStore;

/// Terminal state of one entry in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Invalid,
    Seen,
    Error,
    Filtered,
    DuplicateContent,
    Sent,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Invalid => "invalid",
            Outcome::Seen => "seen",
            Outcome::Error => "error",
            Outcome::Filtered => "filtered",
            Outcome::DuplicateContent => "duplicate_content",
            Outcome::Sent => "sent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryResult {
    pub feed: String,
    pub url: String,
    pub title: String,
    pub outcome: Outcome,
}

/// What one `poll_once` did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub entries: Vec<EntryResult>,
    pub invalid: usize,
    pub seen: usize,
    pub error: usize,
    pub filtered: usize,
    pub duplicate_content: usize,
    pub sent: usize,
    pub feed_errors: usize,
    pub batches_delivered: usize,
    pub batches_failed: usize,
    pub cap_hit: bool,
    pub cancelled: bool,
    /// Rows removed when this cycle ran the prune; `None` when it did not.
    pub pruned: Option<u64>,
}

impl CycleReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Invalid => self.invalid,
            Outcome::Seen => self.seen,
            Outcome::Error => self.error,
            Outcome::Filtered => self.filtered,
            Outcome::DuplicateContent => self.duplicate_content,
            Outcome::Sent => self.sent,
        }
    }

    /// Outcomes in processing order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.entries.iter().map(|e| e.outcome).collect()
    }

    fn tally(&mut self, feed: &str, entry: &FeedEntry, outcome: Outcome) {
        match outcome {
            Outcome::Invalid => self.invalid += 1,
            Outcome::Seen => self.seen += 1,
            Outcome::Error => self.error += 1,
            Outcome::Filtered => self.filtered += 1,
            Outcome::DuplicateContent => self.duplicate_content += 1,
            Outcome::Sent => self.sent += 1,
        }
        self.entries.push(EntryResult {
            feed: feed.to_string(),
            url: entry.link.trim().to_string(),
            title: entry.title.trim().to_string(),
            outcome,
        });
    }
}

pub struct Poller {
    cfg: Arc<AppConfig>,
    store: SeenStore,
    filter: KeywordFilter,
    feeds: Arc<dyn FeedSource>,
    fetcher: Arc<dyn ContentFetcher>,
    dispatcher: BatchDispatcher,
    cancel: CancellationToken,
    last_prune: Option<Instant>,
}

impl Poller {
    pub fn new(
        cfg: Arc<AppConfig>,
        store: SeenStore,
        feeds: Arc<dyn FeedSource>,
        fetcher: Arc<dyn ContentFetcher>,
        dispatcher: BatchDispatcher,
    ) -> Self {
        let filter = KeywordFilter::new(&cfg.keywords);
        Self {
            cfg,
            store,
            filter,
            feeds,
            fetcher,
            dispatcher,
            cancel: CancellationToken::new(),
            last_prune: None,
        }
    }

    /// Token checked between feeds and entries; it also cuts the cooldown short.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &SeenStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    /// One full pass over all feeds, then flush and (maybe) prune.
    pub async fn poll_once(&mut self) -> CycleReport {
        crate::metrics::ensure_metrics_described();
        let started = Instant::now();
        let delivered_before = self.dispatcher.delivered_batches();
        let failed_before = self.dispatcher.failed_batches();
        let cfg = Arc::clone(&self.cfg);
        let mut report = CycleReport::default();

        for (i, feed) in cfg.feeds.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if report.sent >= cfg.poll.max_sends_per_poll {
                report.cap_hit = true;
                break;
            }

            self.poll_feed(feed, &mut report).await;
            if report.sent >= cfg.poll.max_sends_per_poll {
                report.cap_hit = true;
            }
            if report.cancelled || report.cap_hit {
                break;
            }

            if i + 1 < cfg.feeds.len() {
                debug!(target: "engine", feed = %feed.name, secs = cfg.poll.feed_cooldown_secs, "feed cooldown");
                if !sleep_or_cancel(cfg.poll.feed_cooldown(), &self.cancel).await {
                    report.cancelled = true;
                    break;
                }
            }
        }

        if report.cap_hit {
            info!(target: "engine", cap = cfg.poll.max_sends_per_poll, "reached max sends per poll");
        }

        // pending items are already recorded as seen, so flush even when cancelled
        self.dispatcher.flush().await;
        report.batches_delivered = self.dispatcher.delivered_batches() - delivered_before;
        report.batches_failed = self.dispatcher.failed_batches() - failed_before;

        report.pruned = self.maybe_prune().await;

        counter!("poll_cycles_total").increment(1);
        gauge!("poll_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        histogram!("poll_cycle_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        info!(
            target: "engine",
            sent = report.sent,
            seen = report.seen,
            filtered = report.filtered,
            duplicate_content = report.duplicate_content,
            errors = report.error,
            invalid = report.invalid,
            feed_errors = report.feed_errors,
            batches = report.batches_delivered,
            cancelled = report.cancelled,
            "poll completed"
        );
        report
    }

    async fn poll_feed(&mut self, feed: &FeedSpec, report: &mut CycleReport) {
        info!(target: "engine", feed = %feed.name, url = %feed.url, "fetching feed");
        let entries = match self.feeds.fetch_entries(&feed.url).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(target: "engine", feed = %feed.name, error = %e, "feed retrieval failed; skipping");
                counter!("poll_feed_errors_total").increment(1);
                report.feed_errors += 1;
                return;
            }
        };

        for entry in &entries {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            if report.sent >= self.cfg.poll.max_sends_per_poll {
                report.cap_hit = true;
                return;
            }

            let outcome = self.process_entry(&feed.name, entry).await;
            report.tally(&feed.name, entry, outcome);
        }
    }

    /// Run one entry through the checks. An accepted entry is recorded as seen
    /// and added to the dispatcher (which may flush a full batch).
    pub async fn process_entry(&mut self, feed_name: &str, entry: &FeedEntry) -> Outcome {
        let outcome = match self.evaluate(feed_name, entry).await {
            Ok(c) => {
                self.mark_seen(&c.url, &c.title, &c.content_summary, entry.published_at)
                    .await;
                self.dispatcher.add(c).await;
                Outcome::Sent
            }
            Err(o) => o,
        };

        counter!("poll_entries_total", "outcome" => outcome.as_str()).increment(1);
        info!(
            target: "engine",
            feed = %feed_name,
            outcome = outcome.as_str(),
            title = %entry.title.trim(),
            "entry processed"
        );
        outcome
    }

    /// `Ok` is an accepted candidate; `Err` carries the rejecting outcome.
    /// Every side effect except the final acceptance happens here.
    async fn evaluate(&self, feed_name: &str, entry: &FeedEntry) -> Result<Candidate, Outcome> {
        let url = entry.link.trim();
        let title = entry.title.trim();
        if url.is_empty() || title.is_empty() {
            return Err(Outcome::Invalid);
        }

        // cheap probe before downloading anything
        if self.is_seen(url, title, "").await {
            return Err(Outcome::Seen);
        }

        let fetch = &self.cfg.fetch;
        let html = match self.fetcher.fetch(url, fetch.timeout(), fetch.retries).await {
            Ok(body) => body,
            Err(e) => {
                self.handle_fetch_failure(url, title, entry.published_at, &e)
                    .await;
                return Err(Outcome::Error);
            }
        };
        if let Err(e) = self.store.clear_fetch_failures(url).await {
            debug!(target: "engine", url, error = %e, "could not clear fetch-failure counter");
        }
        let summary = extract_summary(&html, fetch.summary_chars);

        match self.filter.matched(title, &summary) {
            Some(kw) => debug!(target: "engine", url, keyword = kw, "keyword matched"),
            None => {
                self.mark_seen(url, title, &summary, entry.published_at).await;
                return Err(Outcome::Filtered);
            }
        }

        if self.is_seen(url, title, &summary).await {
            self.mark_seen(url, title, &summary, entry.published_at).await;
            return Err(Outcome::DuplicateContent);
        }

        Ok(Candidate {
            feed_name: feed_name.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            content_summary: summary,
        })
    }

    /// A failing probe counts as "not seen": better to re-evaluate than to drop new content.
    async fn is_seen(&self, url: &str, title: &str, content: &str) -> bool {
        match self.store.find_match(url, title, content).await {
            Ok(Some(key)) => {
                debug!(target: "engine", url, key = key.as_str(), "dedup hit");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(target: "engine", url, error = %e, "existence check failed; treating as new");
                false
            }
        }
    }

    async fn mark_seen(&self, url: &str, title: &str, content: &str, published_at: Option<i64>) {
        if let Err(e) = self.store.record(url, title, content, published_at).await {
            warn!(target: "engine", url, error = %e, "failed to record article as seen");
        }
    }

    /// Count the failure; at `max_fetch_failures` the URL is recorded so it stops being retried.
    async fn handle_fetch_failure(
        &self,
        url: &str,
        title: &str,
        published_at: Option<i64>,
        err: &FetchError,
    ) {
        let max = self.cfg.fetch.max_fetch_failures;
        match self.store.note_fetch_failure(url, &err.to_string()).await {
            Ok(n) if max > 0 && n >= max => {
                warn!(target: "engine", url, failures = n, error = %err, "content fetch keeps failing; giving up on url");
                self.mark_seen(url, title, "", published_at).await;
                if let Err(e) = self.store.clear_fetch_failures(url).await {
                    debug!(target: "engine", url, error = %e, "could not clear fetch-failure counter");
                }
            }
            Ok(n) => {
                warn!(target: "engine", url, failures = n, error = %err, "content fetch failed; will retry next cycle");
            }
            Err(e) => {
                warn!(target: "engine", url, error = %err, store_error = %e, "content fetch failed; failure not counted");
            }
        }
    }

    /// Prune on the first cycle, then once per `store.prune_interval_secs`.
    async fn maybe_prune(&mut self) -> Option<u64> {
        let due = self
            .last_prune
            .map_or(true, |t| t.elapsed() >= self.cfg.store.prune_interval());
        if !due {
            return None;
        }
        self.last_prune = Some(Instant::now());

        match self.store.prune(self.cfg.store.retention()).await {
            Ok(n) => {
                counter!("store_pruned_total").increment(n);
                Some(n)
            }
            Err(e) => {
                warn!(target: "engine", error = %e, "prune failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::{DeliveryError, FeedError};
    use crate::notify::{Delivery, DeliverySink};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct NoFeeds;

    #[async_trait::async_trait]
    impl FeedSource for NoFeeds {
        async fn fetch_entries(&self, _url: &str) -> Result<Vec<FeedEntry>, FeedError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Pages {
        bodies: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ContentFetcher for Pages {
        async fn fetch(&self, url: &str, timeout: Duration, _retries: u32) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or(FetchError::Timeout(timeout))
        }
    }

    struct NullSink;

    #[async_trait::async_trait]
    impl DeliverySink for NullSink {
        async fn deliver(&self, _msg: &Delivery) -> Result<(), DeliveryError> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "null"
        }
    }

    async fn poller(pages: Pages) -> (Poller, Arc<Pages>) {
        let mut cfg = AppConfig::default();
        cfg.poll.feed_cooldown_secs = 0;
        let store = SeenStore::open_in_memory(&StoreConfig::default())
            .await
            .unwrap();
        let pages = Arc::new(pages);
        let dispatcher = BatchDispatcher::new(Arc::new(NullSink), "-100", 3).with_pause(Duration::ZERO);
        let p = Poller::new(Arc::new(cfg), store, Arc::new(NoFeeds), pages.clone(), dispatcher);
        (p, pages)
    }

    #[tokio::test]
    async fn rups_entry_is_sent_and_recorded() {
        let mut pages = Pages::default();
        pages.bodies.insert("https://a/1".into(), "<p>isi</p>".into());
        let (mut p, _) = poller(pages).await;

        let e = FeedEntry::new("Perusahaan X Lakukan RUPS", "https://a/1");
        assert_eq!(p.process_entry("f", &e).await, Outcome::Sent);
        assert!(p.store().exists("https://a/1", "", "").await.unwrap());
        assert_eq!(p.dispatcher().pending().len(), 1);
        assert_eq!(p.dispatcher().pending()[0].content_summary, "isi");

        assert_eq!(p.process_entry("f", &e).await, Outcome::Seen);
        assert_eq!(p.store().count().await.unwrap(), 1);
        assert_eq!(p.dispatcher().pending().len(), 1);
    }

    #[tokio::test]
    async fn invalid_entry_never_touches_store_or_fetcher() {
        let (mut p, pages) = poller(Pages::default()).await;
        assert_eq!(
            p.process_entry("f", &FeedEntry::new("  ", "https://a/1")).await,
            Outcome::Invalid
        );
        assert_eq!(
            p.process_entry("f", &FeedEntry::new("RUPS", "")).await,
            Outcome::Invalid
        );
        assert_eq!(p.store().count().await.unwrap(), 0);
        assert!(pages.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn irrelevant_entry_is_filtered_but_recorded() {
        let mut pages = Pages::default();
        pages.bodies.insert("https://a/2".into(), "laba naik".into());
        let (mut p, _) = poller(pages).await;

        let e = FeedEntry::new("Laporan Keuangan Q3", "https://a/2");
        assert_eq!(p.process_entry("f", &e).await, Outcome::Filtered);
        assert_eq!(p.store().count().await.unwrap(), 1);
        assert!(p.dispatcher().pending().is_empty());
    }

    #[tokio::test]
    async fn keyword_in_content_only_is_enough() {
        let mut pages = Pages::default();
        pages
            .bodies
            .insert("https://a/3".into(), "Emiten akan menggelar RUPS luar biasa".into());
        let (mut p, _) = poller(pages).await;
        let e = FeedEntry::new("Kabar emiten hari ini", "https://a/3");
        assert_eq!(p.process_entry("f", &e).await, Outcome::Sent);
    }

    #[tokio::test]
    async fn fetch_failure_is_error_and_not_recorded() {
        let (mut p, _) = poller(Pages::default()).await;
        let e = FeedEntry::new("RUPS tahunan", "https://down/1");
        assert_eq!(p.process_entry("f", &e).await, Outcome::Error);
        assert_eq!(p.store().count().await.unwrap(), 0);
        assert_eq!(p.store().fetch_failures("https://down/1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn first_cycle_prunes_then_waits_for_interval() {
        let (mut p, _) = poller(Pages::default()).await;
        let first = p.poll_once().await;
        assert_eq!(first.pruned, Some(0));
        let second = p.poll_once().await;
        assert_eq!(second.pruned, None);
    }
}
