// src/error.rs
//! Failure types for the I/O collaborators around the poll engine.
//! The engine converts all of these into per-entry outcomes or log lines.

use std::time::Duration;

/// Content fetch failed after all attempts.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Feed retrieval failed as a whole (a partial parse is not an error).
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("feed parse error: {0}")]
    Parse(String),
}

/// The delivery sink rejected a batch or could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery not configured: {0}")]
    NotConfigured(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
