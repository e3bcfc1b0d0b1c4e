// src/store.rs
//! Seen-article store: one SQLite table keyed by URL, with two secondary
//! hash keys (normalized title, normalized content sample).
//!
//! A record is a duplicate if *any* of the three keys matches, so each key
//! has its own index and its own probe. Pruning is housekeeping only; dedup
//! stays correct if it never runs.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::ingest::{normalize_for_match, truncate_chars};

/// Which dedup key matched an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    Url,
    TitleHash,
    ContentHash,
}

impl DedupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupKey::Url => "url",
            DedupKey::TitleHash => "title_hash",
            DedupKey::ContentHash => "content_hash",
        }
    }
}

fn sha256_hex(text: &str) -> String {
    use std::fmt::Write as _;
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Hash of the normalized title.
pub fn title_hash(title: &str) -> String {
    sha256_hex(&normalize_for_match(title))
}

/// Hash of the normalized first `sample_chars` characters of `content`.
/// `None` when there is no usable content (empty, or only punctuation/whitespace).
pub fn content_hash(content: &str, sample_chars: usize) -> Option<String> {
    let sample = normalize_for_match(&truncate_chars(content, sample_chars));
    if sample.is_empty() {
        None
    } else {
        Some(sha256_hex(&sample))
    }
}

#[derive(Clone)]
pub struct SeenStore {
    pool: SqlitePool,
    content_sample_chars: usize,
    title_chars: usize,
}

impl SeenStore {
    /// Open (or create) the store file and ensure the schema exists.
    pub async fn open(path: &Path, cfg: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool, cfg).await
    }

    /// Private in-memory store; lives as long as the returned value.
    pub async fn open_in_memory(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let opts: SqliteConnectOptions = "sqlite::memory:".parse()?;
        // One never-recycled connection, otherwise each connection sees its own empty DB
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool, cfg).await
    }

    async fn with_pool(pool: SqlitePool, cfg: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            content_sample_chars: cfg.content_sample_chars,
            title_chars: cfg.title_chars,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title_hash TEXT NOT NULL,
                content_hash TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                published_at INTEGER,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_seen_url ON seen_articles(url)",
            "CREATE INDEX IF NOT EXISTS idx_seen_title_hash ON seen_articles(title_hash)",
            "CREATE INDEX IF NOT EXISTS idx_seen_content_hash ON seen_articles(content_hash)",
            "CREATE INDEX IF NOT EXISTS idx_seen_created_at ON seen_articles(created_at)",
        ] {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fetch_failures (
                url TEXT PRIMARY KEY,
                failures INTEGER NOT NULL,
                last_error TEXT,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// First dedup key that matches an existing record, probing URL, then title
    /// hash, then (only for non-empty `content`) content hash.
    pub async fn find_match(
        &self,
        url: &str,
        title: &str,
        content: &str,
    ) -> Result<Option<DedupKey>, StoreError> {
        let hit = sqlx::query_scalar::<_, i64>("SELECT 1 FROM seen_articles WHERE url = ? LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        if hit.is_some() {
            return Ok(Some(DedupKey::Url));
        }

        let hit = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM seen_articles WHERE title_hash = ? LIMIT 1",
        )
        .bind(title_hash(title))
        .fetch_optional(&self.pool)
        .await?;
        if hit.is_some() {
            return Ok(Some(DedupKey::TitleHash));
        }

        if let Some(ch) = content_hash(content, self.content_sample_chars) {
            let hit = sqlx::query_scalar::<_, i64>(
                "SELECT 1 FROM seen_articles WHERE content_hash = ? LIMIT 1",
            )
            .bind(ch)
            .fetch_optional(&self.pool)
            .await?;
            if hit.is_some() {
                return Ok(Some(DedupKey::ContentHash));
            }
        }

        Ok(None)
    }

    /// True if any dedup key of `(url, title, content)` is already recorded.
    pub async fn exists(&self, url: &str, title: &str, content: &str) -> Result<bool, StoreError> {
        Ok(self.find_match(url, title, content).await?.is_some())
    }

    /// Record an article as seen. Returns `false` (and changes nothing) when the URL exists.
    pub async fn record(
        &self,
        url: &str,
        title: &str,
        content: &str,
        published_at: Option<i64>,
    ) -> Result<bool, StoreError> {
        self.record_at(url, title, content, published_at, Utc::now())
            .await
    }

    /// `record` with an explicit insertion time.
    pub async fn record_at(
        &self,
        url: &str,
        title: &str,
        content: &str,
        published_at: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            INSERT INTO seen_articles (url, title_hash, content_hash, title, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(url)
        .bind(title_hash(title))
        .bind(content_hash(content, self.content_sample_chars).unwrap_or_default())
        .bind(truncate_chars(title, self.title_chars))
        .bind(published_at)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        let inserted = res.rows_affected() == 1;
        if !inserted {
            debug!(target: "store", url, "already recorded");
        }
        Ok(inserted)
    }

    /// Delete records (and stale fetch-failure rows) created before `now - older_than`.
    pub async fn prune(&self, older_than: ChronoDuration) -> Result<u64, StoreError> {
        self.prune_at(older_than, Utc::now()).await
    }

    pub async fn prune_at(
        &self,
        older_than: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let cutoff = (now - older_than).timestamp();

        let deleted = sqlx::query("DELETE FROM seen_articles WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM fetch_failures WHERE updated_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        if deleted > 0 {
            info!(target: "store", deleted, "pruned old seen articles");
        }
        Ok(deleted)
    }

    /// Bump the consecutive-failure counter for `url`; returns the new count.
    pub async fn note_fetch_failure(&self, url: &str, error: &str) -> Result<u32, StoreError> {
        let failures = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO fetch_failures (url, failures, last_error, updated_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                failures = failures + 1,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            RETURNING failures
        "#,
        )
        .bind(url)
        .bind(truncate_chars(error, 500))
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(failures).unwrap_or(u32::MAX))
    }

    pub async fn clear_fetch_failures(&self, url: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM fetch_failures WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fetch_failures(&self, url: &str) -> Result<u32, StoreError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT failures FROM fetch_failures WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .unwrap_or(0);
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seen_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Release pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
