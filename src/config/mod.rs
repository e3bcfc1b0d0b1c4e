// src/config/mod.rs
//! Application configuration: one `AppConfig` built at startup and shared by reference.
//!
//! Resolution order:
//! 1) TOML file at $NEWSBOT_CONFIG_PATH, else `config/newsbot.toml` (missing file = defaults)
//! 2) optional keyword file (`keywords_path`)
//! 3) `NEWSBOT_*` env overrides

pub mod keywords;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/newsbot.toml";
pub const ENV_CONFIG_PATH: &str = "NEWSBOT_CONFIG_PATH";
pub const ENV_BOT_TOKEN: &str = "NEWSBOT_BOT_TOKEN";
pub const ENV_CHAT_ID: &str = "NEWSBOT_CHAT_ID";

/// One configured feed. Order in the list is the polling order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

impl FeedSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub max_sends_per_poll: usize,
    pub feed_cooldown_secs: u64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_sends_per_poll: 9, // three batches of three
            feed_cooldown_secs: 45,
            batch_size: 3,
            batch_pause_ms: 1_000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn feed_cooldown(&self) -> Duration {
        Duration::from_secs(self.feed_cooldown_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub summary_chars: usize,
    pub feed_timeout_secs: u64,
    /// Consecutive content-fetch failures after which a URL is recorded as seen.
    pub max_fetch_failures: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "NewsBot/1.0 (+https://example.org)".to_string(),
            timeout_secs: 10,
            retries: 1,
            retry_delay_ms: 1_000,
            summary_chars: 1_000,
            feed_timeout_secs: 20,
            max_fetch_failures: 3,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub retention_days: i64,
    pub prune_interval_secs: u64,
    pub content_sample_chars: usize,
    pub title_chars: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("seen_news.db"),
            retention_days: 30,
            prune_interval_secs: 3_600,
            content_sample_chars: 500,
            title_chars: 200,
        }
    }
}

impl StoreConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.max(0))
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Which delivery backend receives formatted batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Telegram,
    Discord,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub kind: SinkKind,
    /// "ENV" means: read from NEWSBOT_BOT_TOKEN
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub webhook_url: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
    pub disable_preview: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Telegram,
            bot_token: None,
            chat_id: None,
            webhook_url: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 10,
            disable_preview: false,
        }
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// e.g. "127.0.0.1:9184"; exporter stays off when unset
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feeds: Vec<FeedSpec>,
    pub keywords: Vec<String>,
    pub keywords_path: Option<PathBuf>,
    pub poll: PollConfig,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub delivery: DeliveryConfig,
    pub metrics: MetricsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feeds: vec![
                FeedSpec::new("cnbc_market", "https://www.cnbcindonesia.com/market/rss/"),
                FeedSpec::new("kontan_keuangan", "https://www.kontan.co.id/feed"),
            ],
            keywords: default_keywords(),
            keywords_path: None,
            poll: PollConfig::default(),
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
            delivery: DeliveryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

pub fn default_keywords() -> Vec<String> {
    [
        "right issue",
        "aksi korporasi",
        "rups",
        "akuisisi",
        "backdoor",
        "expansi",
        "ekspansi",
        "stock split",
        "stock-split",
        "ipo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load using $NEWSBOT_CONFIG_PATH or the default path, then apply env overrides.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    /// Load from `path` (defaults when the file does not exist), then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        if let Some(kw_path) = cfg.keywords_path.clone() {
            cfg.keywords = keywords::load_keywords_from(&kw_path)?;
        }

        cfg.apply_overrides(|k| std::env::var(k).ok());
        cfg.finalize()?;
        Ok(cfg)
    }

    /// Parse a TOML document. Does not read env or keyword files.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    /// Apply `NEWSBOT_*` overrides from `lookup`. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn num<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|s| s.trim().parse::<T>().ok())
        }

        if let Some(t) = lookup(ENV_BOT_TOKEN).filter(|s| !s.trim().is_empty()) {
            self.delivery.bot_token = Some(t.trim().to_string());
        }
        if let Some(c) = lookup(ENV_CHAT_ID).filter(|s| !s.trim().is_empty()) {
            self.delivery.chat_id = Some(c.trim().to_string());
        }
        if let Some(p) = lookup("NEWSBOT_DB_PATH").filter(|s| !s.trim().is_empty()) {
            self.store.path = PathBuf::from(p.trim());
        }
        if let Some(v) = num(lookup("NEWSBOT_POLL_INTERVAL_SECS")) {
            self.poll.interval_secs = v;
        }
        if let Some(v) = num(lookup("NEWSBOT_MAX_SENDS_PER_POLL")) {
            self.poll.max_sends_per_poll = v;
        }
        if let Some(v) = num(lookup("NEWSBOT_BATCH_SIZE")) {
            self.poll.batch_size = v;
        }
        if let Some(v) = num(lookup("NEWSBOT_FEED_COOLDOWN_SECS")) {
            self.poll.feed_cooldown_secs = v;
        }

        // "ENV" placeholder in the file means the token must come from the environment
        if self
            .delivery
            .bot_token
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("env"))
        {
            self.delivery.bot_token = lookup(ENV_BOT_TOKEN).filter(|s| !s.trim().is_empty());
        }
    }

    /// Sanitize values and reject configurations the engine cannot run with.
    pub fn finalize(&mut self) -> Result<()> {
        if self.poll.batch_size == 0 {
            self.poll.batch_size = 1;
        }
        self.keywords = keywords::clean_list(std::mem::take(&mut self.keywords));

        if self.feeds.is_empty() {
            bail!("no feeds configured");
        }
        for f in &self.feeds {
            if f.name.trim().is_empty() || f.url.trim().is_empty() {
                return Err(anyhow!("feed entry with empty name or url: {f:?}"));
            }
        }
        if self.keywords.is_empty() {
            tracing::warn!("keyword list is empty; every entry will be filtered out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_cover_two_feeds_and_keywords() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.feeds[0].name, "cnbc_market");
        assert_eq!(cfg.poll.max_sends_per_poll, 9);
        assert_eq!(cfg.poll.batch_size, 3);
        assert_eq!(cfg.poll.feed_cooldown_secs, 45);
        assert_eq!(cfg.store.retention_days, 30);
        assert!(cfg.keywords.iter().any(|k| k == "rups"));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let s = r#"
keywords = ["ipo"]

[[feeds]]
name = "a"
url = "https://a/rss"

[poll]
batch_size = 5
"#;
        let cfg = AppConfig::from_toml_str(s).unwrap();
        assert_eq!(cfg.feeds, vec![FeedSpec::new("a", "https://a/rss")]);
        assert_eq!(cfg.keywords, vec!["ipo".to_string()]);
        assert_eq!(cfg.poll.batch_size, 5);
        assert_eq!(cfg.poll.max_sends_per_poll, 9);
        assert_eq!(cfg.delivery.kind, SinkKind::Telegram);
    }

    #[test]
    fn env_overrides_and_env_token_placeholder() {
        let mut cfg = AppConfig::default();
        cfg.delivery.bot_token = Some("ENV".into());

        let env: HashMap<&str, &str> = [
            ("NEWSBOT_BOT_TOKEN", "123:abc"),
            ("NEWSBOT_BATCH_SIZE", "4"),
            ("NEWSBOT_MAX_SENDS_PER_POLL", "not-a-number"),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.delivery.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(cfg.poll.batch_size, 4);
        assert_eq!(cfg.poll.max_sends_per_poll, 9);
    }

    #[test]
    fn env_placeholder_without_env_clears_token() {
        let mut cfg = AppConfig::default();
        cfg.delivery.bot_token = Some("env".into());
        cfg.apply_overrides(|_| None);
        assert_eq!(cfg.delivery.bot_token, None);
    }

    #[test]
    fn finalize_clamps_batch_size_and_rejects_empty_feeds() {
        let mut cfg = AppConfig::default();
        cfg.poll.batch_size = 0;
        cfg.finalize().unwrap();
        assert_eq!(cfg.poll.batch_size, 1);

        cfg.feeds.clear();
        assert!(cfg.finalize().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.feeds.len(), 2);
    }
}
