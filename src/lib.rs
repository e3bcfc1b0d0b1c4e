// src/lib.rs
// Public library surface for integration tests (and the binary).

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod relevance;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, FeedSpec};
pub use crate::dispatch::{BatchDispatcher, Candidate};
pub use crate::engine::{CycleReport, Outcome, Poller};
pub use crate::ingest::types::{ContentFetcher, FeedEntry, FeedSource};
pub use crate::notify::{Delivery, DeliverySink};
pub use crate::store::SeenStore;
