// src/ingest/types.rs
use std::time::Duration;

use crate::error::{FeedError, FetchError};

/// One item as returned by a feed source, before any filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: Option<i64>, // unix seconds, when the feed provides a parsable date
}

impl FeedEntry {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            published_at: None,
        }
    }
}

/// Retrieves the ordered entry list of one feed.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>, FeedError>;
}

/// Retrieves page text for an article URL.
///
/// Fails after `retries + 1` attempts with the last underlying error.
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration, retries: u32)
        -> Result<String, FetchError>;
}
