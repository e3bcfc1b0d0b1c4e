// src/ingest/scheduler.rs
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{CycleReport, Poller};

#[derive(Clone, Copy, Debug)]
pub struct PollSchedulerCfg {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
}

/// Sleep for `dur` unless `cancel` fires first. Returns `false` when cancelled.
pub async fn sleep_or_cancel(dur: Duration, cancel: &CancellationToken) -> bool {
    if dur.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(dur) => true,
    }
}

/// Run cycles back to back, sleeping `cfg.interval` after each, until cancelled.
/// Returns the report of the last completed cycle.
/// Cycles never overlap: the next one starts only after the previous returned.
pub async fn run_loop(
    poller: &mut Poller,
    cfg: PollSchedulerCfg,
    cancel: CancellationToken,
) -> Option<CycleReport> {
    let mut last = None;
    tracing::info!(target: "scheduler", interval_secs = cfg.interval.as_secs(), "poll loop started");

    while !cancel.is_cancelled() {
        let report = poller.poll_once().await;
        tracing::info!(
            target: "scheduler",
            sent = report.sent,
            seen = report.seen,
            filtered = report.filtered,
            errors = report.error,
            feed_errors = report.feed_errors,
            cap_hit = report.cap_hit,
            "poll cycle finished"
        );
        last = Some(report);

        if !sleep_or_cancel(cfg.interval, &cancel).await {
            break;
        }
    }

    tracing::info!(target: "scheduler", "poll loop stopped");
    last
}

/// Spawn `run_loop` on the runtime; the poller moves into the task.
pub fn spawn_poll_scheduler(
    mut poller: Poller,
    cfg: PollSchedulerCfg,
    cancel: CancellationToken,
) -> JoinHandle<Option<CycleReport>> {
    tokio::spawn(async move { run_loop(&mut poller, cfg, cancel).await })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_sleep_reports_cancellation() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::ZERO, &cancel).await);
        cancel.cancel();
        assert!(!sleep_or_cancel(Duration::ZERO, &cancel).await);
    }

    #[tokio::test]
    async fn cancel_interrupts_long_sleep() {
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        let h = tokio::spawn(async move { sleep_or_cancel(Duration::from_secs(3600), &c).await });
        cancel.cancel();
        assert!(!h.await.unwrap());
    }
}
