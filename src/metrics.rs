use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "poll_entries_total",
            "Feed entries processed, labelled by outcome."
        );
        describe_counter!(
            "poll_feed_errors_total",
            "Feeds skipped because retrieval or parsing failed."
        );
        describe_counter!("dispatch_batches_total", "Batches delivered to the sink.");
        describe_counter!(
            "dispatch_failures_total",
            "Batches the sink rejected or failed to accept."
        );
        describe_counter!("store_pruned_total", "Seen-article rows removed by pruning.");
        describe_counter!(
            "fetch_attempt_failures_total",
            "Failed content-fetch attempts, retries included."
        );
        describe_counter!(
            "feed_partial_parse_total",
            "Feeds whose XML was only partially parsed."
        );
        describe_gauge!("poll_last_run_ts", "Unix ts when the last poll cycle finished.");
        describe_histogram!("poll_cycle_ms", "Poll cycle duration in milliseconds.");
        describe_histogram!("feed_parse_ms", "Feed XML parse time in milliseconds.");
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `listen`.
pub fn install_exporter(listen: &str) -> anyhow::Result<SocketAddr> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address {listen:?}: {e}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus: install exporter: {e}"))?;
    ensure_metrics_described();
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describing_twice_is_harmless() {
        ensure_metrics_described();
        ensure_metrics_described();
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        assert!(install_exporter("not-an-addr").is_err());
    }
}
