//! # engine::stats
//!
//! Lock-free counters shared by every worker, plus the periodic stats line.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::engine::shutdown_requested;

#[derive(Debug, Default)]
pub struct EngineStats {
    pub running: AtomicBool,
    /// Records pulled from the input topic.
    pub consumed: AtomicU64,
    /// Records skipped as malformed.
    pub malformed: AtomicU64,
    /// RSI events acknowledged by the broker.
    pub emitted: AtomicU64,
    /// Individual publish attempts that failed and were retried.
    pub publish_retries: AtomicU64,
    /// Retry budgets exhausted; the event was held and re-sent.
    pub publish_failures: AtomicU64,
    /// Distinct instruments with a window.
    pub instruments: AtomicU64,
}

/// Point-in-time copy for logging and `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub consumed: u64,
    pub malformed: u64,
    pub emitted: u64,
    pub publish_retries: u64,
    pub publish_failures: u64,
    pub instruments: u64,
}

impl EngineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            running: self.running.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            instruments: self.instruments.load(Ordering::Relaxed),
        }
    }
}

/// Log a stats line every `interval` until `shutdown` flips to `true`.
pub async fn report_periodically(
    stats: Arc<EngineStats>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let s = stats.snapshot();
                info!(
                    consumed         = s.consumed,
                    malformed        = s.malformed,
                    emitted          = s.emitted,
                    publish_retries  = s.publish_retries,
                    publish_failures = s.publish_failures,
                    instruments      = s.instruments,
                    "📊 Engine stats"
                );
            }
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }
}
