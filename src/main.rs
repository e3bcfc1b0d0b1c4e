//! newsbot-relay: binary entrypoint.
//! Loads config, opens the seen-article store, wires the poller and runs
//! one cycle (`--once`) or the interval loop until Ctrl-C.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsbot_relay::config::{AppConfig, SinkKind};
use newsbot_relay::ingest::fetcher::HttpContentFetcher;
use newsbot_relay::ingest::providers::rss::RssFeedSource;
use newsbot_relay::ingest::scheduler::{run_loop, PollSchedulerCfg};
use newsbot_relay::notify::build_sink;
use newsbot_relay::{BatchDispatcher, Poller, SeenStore};

#[derive(Debug, Parser)]
#[command(name = "newsbot-relay", version, about = "Relay keyword-matching RSS news to a chat")]
struct Args {
    /// Config file (default: $NEWSBOT_CONFIG_PATH or config/newsbot.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Log batches instead of delivering them
    #[arg(long)]
    dry_run: bool,
}

/// Compact logs by default; `NEWSBOT_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newsbot_relay=info,warn"));

    let json = std::env::var("NEWSBOT_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; missing file is fine
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    if args.dry_run {
        cfg.delivery.kind = SinkKind::Log;
    }
    let cfg = Arc::new(cfg);

    if let Some(listen) = cfg.metrics.listen.as_deref() {
        let addr = newsbot_relay::metrics::install_exporter(listen)?;
        tracing::info!(%addr, "prometheus exporter listening");
    }

    let store = SeenStore::open(&cfg.store.path, &cfg.store)
        .await
        .with_context(|| format!("opening seen store {}", cfg.store.path.display()))?;

    let sink = build_sink(&cfg.delivery).context("configuring delivery sink")?;
    let recipient = cfg.delivery.chat_id.clone().unwrap_or_default();

    let fetcher = HttpContentFetcher::new(&cfg.fetch).context("building http client")?;
    let feeds = RssFeedSource::new(fetcher.client(), cfg.fetch.feed_timeout());

    let cancel = CancellationToken::new();
    let dispatcher = BatchDispatcher::new(sink, recipient, cfg.poll.batch_size)
        .with_pause(cfg.poll.batch_pause())
        .with_disable_preview(cfg.delivery.disable_preview)
        .with_cancellation(cancel.clone());

    let mut poller = Poller::new(
        Arc::clone(&cfg),
        store.clone(),
        Arc::new(feeds),
        Arc::new(fetcher),
        dispatcher,
    )
    .with_cancellation(cancel.clone());

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    tracing::info!(
        feeds = cfg.feeds.len(),
        keywords = cfg.keywords.len(),
        sink = ?cfg.delivery.kind,
        db = %cfg.store.path.display(),
        "newsbot-relay starting"
    );

    if args.once {
        poller.poll_once().await;
    } else {
        let sched = PollSchedulerCfg {
            interval: cfg.poll.interval(),
        };
        run_loop(&mut poller, sched, cancel).await;
    }

    store.close().await;
    Ok(())
}
